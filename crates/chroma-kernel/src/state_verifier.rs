//! [`StateVerifier`] – physical safety interlock / rule engine.
//!
//! Before a [`Command`] is written to the link, pass it through
//! [`StateVerifier::verify`]. Every registered [`Rule`] is evaluated in
//! order; the first violation is returned and the command is **not** sent.
//!
//! The built-in [`WorkspaceBoundsRule`] rejects moves whose target leaves
//! the configured per-axis travel range. Rigs with extra mechanical limits
//! add their own [`Rule`]s.

use chroma_hal::Command;
use chroma_types::{RobotError, Workspace};

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single physical invariant that a command must satisfy.
///
/// Implement this trait to create custom safety rules and add them to a
/// [`StateVerifier`] via [`StateVerifier::add_rule`].
pub trait Rule: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Return `Ok(())` when the command satisfies the invariant.
    fn check(&self, command: &Command) -> Result<(), RobotError>;
}

// ────────────────────────────────────────────────────────────────────────────
// StateVerifier
// ────────────────────────────────────────────────────────────────────────────

/// Rule engine that validates a [`Command`] against all registered
/// [`Rule`]s before it is transmitted.
///
/// # Example
///
/// ```
/// use chroma_hal::Command;
/// use chroma_kernel::state_verifier::StateVerifier;
/// use chroma_types::{GripperState, Position, Workspace};
///
/// let verifier = StateVerifier::for_workspace(Workspace::default());
///
/// let inside = Command::move_to(Position::new(3.0, 3.0, 0.0), GripperState::Open);
/// assert!(verifier.verify(&inside).is_ok());
///
/// let outside = Command::move_to(Position::new(3.0, 3.0, 9.0), GripperState::Open);
/// assert!(verifier.verify(&outside).is_err());
/// ```
#[derive(Default)]
pub struct StateVerifier {
    rules: Vec<Box<dyn Rule>>,
}

impl StateVerifier {
    /// Create an empty verifier with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// A verifier holding a single [`WorkspaceBoundsRule`].
    pub fn for_workspace(workspace: Workspace) -> Self {
        let mut v = Self::new();
        v.add_rule(Box::new(WorkspaceBoundsRule { workspace }));
        v
    }

    /// Register a new [`Rule`]. Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Validate `command` against every registered rule.
    ///
    /// Returns the first error encountered, or `Ok(())` when all rules pass.
    pub fn verify(&self, command: &Command) -> Result<(), RobotError> {
        for rule in &self.rules {
            rule.check(command)?;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Rejects [`Command::Move`] targets outside the workspace with
/// [`RobotError::OutOfBounds`]. Bounds are inclusive.
pub struct WorkspaceBoundsRule {
    pub workspace: Workspace,
}

impl Rule for WorkspaceBoundsRule {
    fn name(&self) -> &str {
        "workspace_bounds"
    }

    fn check(&self, command: &Command) -> Result<(), RobotError> {
        if let Command::Move { position, .. } = command {
            self.workspace.check(position)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chroma_types::{GripperState, Position};

    /// Refuses to carry a closed gripper above `min_z`.
    struct CarryHeightRule {
        min_z: f64,
    }

    impl Rule for CarryHeightRule {
        fn name(&self) -> &str {
            "carry_height"
        }

        fn check(&self, command: &Command) -> Result<(), RobotError> {
            match command {
                Command::Move {
                    position,
                    gripper: GripperState::Closed,
                } if position.z < self.min_z => Err(RobotError::Rejected {
                    command: command.encode(),
                }),
                _ => Ok(()),
            }
        }
    }

    fn mv(x: f64, y: f64, z: f64) -> Command {
        Command::move_to(Position::new(x, y, z), GripperState::Open)
    }

    #[test]
    fn corners_of_the_workspace_pass() {
        let v = StateVerifier::for_workspace(Workspace::default());
        assert!(v.verify(&mv(-1.0, -1.0, -3.0)).is_ok());
        assert!(v.verify(&mv(7.0, 7.0, 5.0)).is_ok());
    }

    #[test]
    fn each_axis_is_checked() {
        let v = StateVerifier::for_workspace(Workspace::default());
        for (cmd, axis) in [
            (mv(7.01, 0.0, 0.0), 'x'),
            (mv(0.0, -1.5, 0.0), 'y'),
            (mv(0.0, 0.0, 5.5), 'z'),
        ] {
            match v.verify(&cmd) {
                Err(RobotError::OutOfBounds { axis: a, .. }) => assert_eq!(a, axis),
                other => panic!("expected OutOfBounds on {axis}, got {other:?}"),
            }
        }
    }

    #[test]
    fn non_move_commands_pass() {
        let v = StateVerifier::for_workspace(Workspace::default());
        assert!(v.verify(&Command::Home).is_ok());
        assert!(v.verify(&Command::GetCamera).is_ok());
    }

    #[test]
    fn empty_verifier_allows_everything() {
        let v = StateVerifier::new();
        assert!(v.verify(&mv(100.0, 100.0, 100.0)).is_ok());
        assert!(v.rule_names().is_empty());
    }

    #[test]
    fn rules_run_in_order() {
        let mut v = StateVerifier::for_workspace(Workspace::default());
        v.add_rule(Box::new(CarryHeightRule { min_z: -1.0 }));
        assert_eq!(v.rule_names(), vec!["workspace_bounds", "carry_height"]);

        let high_closed = Command::move_to(Position::new(1.0, 1.0, -2.0), GripperState::Closed);
        assert!(v.verify(&high_closed).is_err());
        let high_open = mv(1.0, 1.0, -2.0);
        assert!(v.verify(&high_open).is_ok());
    }
}
