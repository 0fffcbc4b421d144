use crate::gateway::EventKind;
use std::fmt;

/// Why a reconciliation pass was requested.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Trigger {
    Startup,
    Event(EventKind),
    Poll,
    Connect,
    SwitchNetwork,
    ForceRefresh,
}

impl Trigger {
    /// Passes after a network change must not reuse a provider handle
    /// captured before it.
    pub fn rebinds(self) -> bool {
        matches!(
            self,
            Trigger::Event(EventKind::ChainChanged) | Trigger::SwitchNetwork
        )
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Startup => f.write_str("startup"),
            Trigger::Event(kind) => write!(f, "event:{kind}"),
            Trigger::Poll => f.write_str("poll"),
            Trigger::Connect => f.write_str("connect"),
            Trigger::SwitchNetwork => f.write_str("switch-network"),
            Trigger::ForceRefresh => f.write_str("force-refresh"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PassPlan {
    pub reason: Trigger,
    pub rebind: bool,
    /// Triggers folded into this pass while the previous one ran.
    pub coalesced: usize,
}

impl PassPlan {
    fn new(reason: Trigger) -> Self {
        Self {
            reason,
            rebind: reason.rebinds(),
            coalesced: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Admission {
    Start(PassPlan),
    Coalesced,
}

/// The single in-flight guard. At most one pass runs at a time; any number
/// of triggers arriving meanwhile collapse into exactly one follow-up pass.
#[derive(Debug, Default)]
pub struct PassGate {
    reconciling: bool,
    pending: Option<PassPlan>,
}

impl PassGate {
    pub fn admit(&mut self, trigger: Trigger) -> Admission {
        if !self.reconciling {
            self.reconciling = true;
            return Admission::Start(PassPlan::new(trigger));
        }
        let pending = self.pending.get_or_insert(PassPlan {
            reason: trigger,
            rebind: false,
            coalesced: 0,
        });
        pending.reason = trigger;
        pending.rebind |= trigger.rebinds();
        pending.coalesced += 1;
        Admission::Coalesced
    }

    /// Ends the running pass. Returns the follow-up to start right away if
    /// anything was recorded while it ran.
    pub fn complete(&mut self) -> Option<PassPlan> {
        self.reconciling = false;
        let follow_up = self.pending.take()?;
        self.reconciling = true;
        Some(follow_up)
    }

    pub fn is_reconciling(&self) -> bool {
        self.reconciling
    }
}
