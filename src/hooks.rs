//! Plugin hook points
//!
//! Plugins register callbacks at fixed points in the supervisor lifecycle;
//! the state machine runs each batch exactly once per transition, between
//! the stop phase and the start phase. Plugin loading itself is out of
//! scope; the registry only dispatches.

/// Lifecycle points a hook batch can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Entering runlevel 0 or 6, before services are stopped.
    Shutdown,
    /// Between the stop and start phases of a runlevel transition.
    RunlevelChange,
    /// After a reconfiguration's stop phase has drained.
    SvcReconf,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::RunlevelChange => "runlevel-change",
            Self::SvcReconf => "svc-reconf",
        }
    }
}

type HookFn = Box<dyn FnMut(HookPoint)>;

#[derive(Default)]
pub struct Hooks {
    subscribers: Vec<(HookPoint, HookFn)>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F: FnMut(HookPoint) + 'static>(&mut self, point: HookPoint, hook: F) {
        self.subscribers.push((point, Box::new(hook)));
    }

    /// Run every hook registered at `point`, in registration order.
    pub fn run(&mut self, point: HookPoint) {
        log::debug!("Calling {} hooks ...", point.as_str());
        for (at, hook) in &mut self.subscribers {
            if *at == point {
                hook(point);
            }
        }
    }
}
