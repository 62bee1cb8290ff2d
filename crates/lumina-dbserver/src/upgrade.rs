/// Outcome of asking the user whether to run the database upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeDecision {
    Proceed,
    Cancel,
}

/// Caller-supplied confirmation for the storage-format upgrade.
///
/// Upgrades can take a long time and must not start behind the user's
/// back, so the supervisor asks before invoking the upgrade tool. GUI
/// frontends implement this with a dialog; `Cancel` leaves the
/// already-running server untouched under the old schema.
pub trait UpgradeConfirmation: Send + Sync {
    fn confirm(&self) -> UpgradeDecision;
}

/// Headless default that always proceeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptUpgrades;

impl UpgradeConfirmation for AcceptUpgrades {
    fn confirm(&self) -> UpgradeDecision {
        UpgradeDecision::Proceed
    }
}
