//! Scenario categories and priority arbitration.

use tracing::{debug, warn};

use crate::error::PolicyError;
use crate::scenario::scenario::{Priority, Scenario};

/// A category of scenarios (media, phone, ringtone, ...), owning the set of
/// named scenarios registered for it and the current choice among them.
///
/// Scenarios are kept in registration order; arbitration is deterministic
/// because ties favor the earliest-registered scenario.
pub struct ScenarioModule {
    name: String,
    scenarios: Vec<Scenario>,
    current: Option<usize>,
}

impl ScenarioModule {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scenarios: Vec::new(),
            current: None,
        }
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a scenario.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::DuplicateScenario`] if a scenario with the
    /// same name already exists in this module.
    pub fn add_scenario(&mut self, scenario: Scenario) -> Result<(), PolicyError> {
        if self.index_of(scenario.name()).is_some() {
            return Err(PolicyError::DuplicateScenario {
                name: scenario.name().to_string(),
            });
        }
        debug!(module = %self.name, scenario = %scenario.name(), priority = %scenario.priority(), "scenario added");
        self.scenarios.push(scenario);
        Ok(())
    }

    /// Looks a scenario up by name.
    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.index_of(name).map(|i| &self.scenarios[i])
    }

    /// The currently-arbitrated scenario, if any.
    pub fn current_scenario(&self) -> Option<&Scenario> {
        self.current.map(|i| &self.scenarios[i])
    }

    /// Enables a scenario and re-arbitrates.
    ///
    /// Returns `true` if the current scenario changed as a result.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownScenario`] for an unknown name; no
    /// state changes in that case.
    pub fn enable_scenario(&mut self, name: &str) -> Result<bool, PolicyError> {
        let idx = self.index_or_warn(name, "enable_scenario")?;
        self.scenarios[idx].set_enabled(true);
        Ok(self.arbitrate())
    }

    /// Disables a scenario and re-arbitrates if it was current.
    ///
    /// Disabling the current scenario temporarily assigns it the lowest
    /// priority sentinel so arbitration can move away from it, then
    /// restores its priority. If nothing else is enabled the scenario
    /// stays current and the disable is rejected.
    ///
    /// Returns `true` if the current scenario changed as a result.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::UnknownScenario`] for an unknown name
    /// - [`PolicyError::Hardwired`] if the scenario cannot be disabled
    /// - [`PolicyError::InvalidParameter`] if it is the last enabled
    ///   scenario in the module
    pub fn disable_scenario(&mut self, name: &str) -> Result<bool, PolicyError> {
        let idx = self.index_or_warn(name, "disable_scenario")?;
        if self.scenarios[idx].is_hardwired() {
            warn!(module = %self.name, scenario = name, "refusing to disable hardwired scenario");
            return Err(PolicyError::Hardwired {
                name: name.to_string(),
            });
        }

        if self.current != Some(idx) {
            self.scenarios[idx].set_enabled(false);
            return Ok(false);
        }

        // Current scenario: park it at the sentinel so anything else
        // enabled outranks it, re-arbitrate, then restore.
        let saved = self.scenarios[idx].priority();
        self.scenarios[idx].set_priority(Priority::LOWEST);
        let changed = self.arbitrate();
        self.scenarios[idx].set_priority(saved);

        if self.current == Some(idx) {
            warn!(module = %self.name, scenario = name, "cannot disable the only enabled scenario");
            return Err(PolicyError::InvalidParameter {
                reason: format!("'{name}' is the only enabled scenario in '{}'", self.name),
            });
        }

        self.scenarios[idx].set_enabled(false);
        Ok(changed)
    }

    /// Makes the named scenario current, bypassing priority.
    ///
    /// The scenario is enabled if it was not already.
    ///
    /// Returns `true` if the current scenario changed.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownScenario`] for an unknown name.
    pub fn set_current_scenario(&mut self, name: &str) -> Result<bool, PolicyError> {
        let idx = self.index_or_warn(name, "set_current_scenario")?;
        self.scenarios[idx].set_enabled(true);
        let changed = self.current != Some(idx);
        self.current = Some(idx);
        Ok(changed)
    }

    /// Re-runs priority arbitration over the enabled scenarios.
    ///
    /// Returns `true` if the current scenario changed.
    pub fn set_current_by_priority(&mut self) -> bool {
        self.arbitrate()
    }

    /// Picks the first enabled scenario, replaced only by strictly greater
    /// priority. Ties keep the earliest-registered scenario.
    fn arbitrate(&mut self) -> bool {
        let mut winner: Option<usize> = None;
        for (idx, scenario) in self.scenarios.iter().enumerate() {
            if !scenario.is_enabled() {
                continue;
            }
            match winner {
                None => winner = Some(idx),
                Some(best) if scenario.priority() > self.scenarios[best].priority() => {
                    winner = Some(idx);
                }
                Some(_) => {}
            }
        }

        let changed = winner != self.current;
        if changed {
            debug!(
                module = %self.name,
                from = self.current.map(|i| self.scenarios[i].name().to_string()),
                to = winner.map(|i| self.scenarios[i].name().to_string()),
                "arbitration moved current scenario"
            );
        }
        self.current = winner;
        changed
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.scenarios.iter().position(|s| s.name() == name)
    }

    fn index_or_warn(&self, name: &str, operation: &str) -> Result<usize, PolicyError> {
        self.index_of(name).ok_or_else(|| {
            warn!(module = %self.name, scenario = name, operation, "unknown scenario");
            PolicyError::UnknownScenario {
                name: name.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;

    fn module_with(priorities: &[(&str, i32)]) -> ScenarioModule {
        let mut m = ScenarioModule::new("test");
        for (name, p) in priorities {
            m.add_scenario(Scenario::new(*name, Priority::new(*p), Volume::new(*name, 50)))
                .unwrap();
        }
        m
    }

    #[test]
    fn test_duplicate_scenario_rejected() {
        let mut m = module_with(&[("a", 1)]);
        let err = m
            .add_scenario(Scenario::new("a", Priority::new(2), Volume::new("a", 0)))
            .unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateScenario { .. }));
    }

    #[test]
    fn test_tied_priorities_favor_earliest_registered() {
        let mut m = module_with(&[("low", 10), ("first70", 70), ("second70", 70)]);
        m.enable_scenario("low").unwrap();
        m.enable_scenario("first70").unwrap();
        m.enable_scenario("second70").unwrap();

        assert_eq!(m.current_scenario().unwrap().name(), "first70");

        // Deterministic across repeated enable/disable cycles.
        for _ in 0..3 {
            m.disable_scenario("first70").unwrap();
            assert_eq!(m.current_scenario().unwrap().name(), "second70");
            m.enable_scenario("first70").unwrap();
            assert_eq!(m.current_scenario().unwrap().name(), "first70");
        }
    }

    #[test]
    fn test_strictly_greater_priority_wins() {
        let mut m = module_with(&[("low", 10), ("high", 70)]);
        m.enable_scenario("low").unwrap();
        assert_eq!(m.current_scenario().unwrap().name(), "low");

        assert!(m.enable_scenario("high").unwrap());
        assert_eq!(m.current_scenario().unwrap().name(), "high");
    }

    #[test]
    fn test_disable_restores_priority() {
        let mut m = module_with(&[("a", 10), ("b", 20)]);
        m.enable_scenario("a").unwrap();
        m.enable_scenario("b").unwrap();

        m.disable_scenario("b").unwrap();
        assert_eq!(m.current_scenario().unwrap().name(), "a");
        // Sentinel must not leak out of the re-arbitration.
        assert_eq!(m.scenario("b").unwrap().priority(), Priority::new(20));

        m.enable_scenario("b").unwrap();
        assert_eq!(m.current_scenario().unwrap().name(), "b");
    }

    #[test]
    fn test_cannot_disable_last_enabled() {
        let mut m = module_with(&[("only", 10)]);
        m.enable_scenario("only").unwrap();

        let err = m.disable_scenario("only").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidParameter { .. }));
        assert_eq!(m.current_scenario().unwrap().name(), "only");
        assert!(m.scenario("only").unwrap().is_enabled());
    }

    #[test]
    fn test_cannot_disable_hardwired() {
        let mut m = ScenarioModule::new("phone");
        m.add_scenario(
            Scenario::new("handset", Priority::new(50), Volume::new("phone", 80)).hardwired(),
        )
        .unwrap();
        m.set_current_by_priority();

        let err = m.disable_scenario("handset").unwrap_err();
        assert!(matches!(err, PolicyError::Hardwired { .. }));
    }

    #[test]
    fn test_unknown_scenario_no_state_change() {
        let mut m = module_with(&[("a", 10)]);
        m.enable_scenario("a").unwrap();

        let err = m.enable_scenario("missing").unwrap_err();
        assert!(matches!(err, PolicyError::UnknownScenario { .. }));
        assert_eq!(m.current_scenario().unwrap().name(), "a");
    }

    #[test]
    fn test_set_current_bypasses_priority() {
        let mut m = module_with(&[("low", 10), ("high", 70)]);
        m.enable_scenario("high").unwrap();

        assert!(m.set_current_scenario("low").unwrap());
        assert_eq!(m.current_scenario().unwrap().name(), "low");

        // Re-arbitration by priority snaps back.
        assert!(m.set_current_by_priority());
        assert_eq!(m.current_scenario().unwrap().name(), "high");
    }
}
