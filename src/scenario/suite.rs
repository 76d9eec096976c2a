//! Suite execution
//!
//! Scenarios run strictly in order by default, all against the root
//! environment. In parallel mode each `group` becomes a lane with its own
//! isolated environment scope; lanes run concurrently, scenarios inside a
//! lane run in order, and ungrouped scenarios form one sequential lane on the
//! root environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use futures_util::future::join_all;

use crate::common::paths::collect_yaml_files;
use crate::common::Result;
use crate::env::Environment;

use super::config::Scenario;
use super::report::{ScenarioReport, SuiteReport};
use super::runner::ScenarioRunner;

/// A scenario together with the file it came from
#[derive(Debug, Clone)]
pub struct LoadedScenario {
    pub path: Option<PathBuf>,
    pub scenario: Scenario,
}

impl From<Scenario> for LoadedScenario {
    fn from(scenario: Scenario) -> Self {
        Self {
            path: None,
            scenario,
        }
    }
}

/// Load every scenario file under the given paths, sorted by path
pub fn load_scenarios(paths: &[PathBuf]) -> Result<Vec<LoadedScenario>> {
    collect_yaml_files(paths)?
        .into_iter()
        .map(|path| load_one(&path))
        .collect()
}

fn load_one(path: &Path) -> Result<LoadedScenario> {
    let scenario = Scenario::load(path)?;
    Ok(LoadedScenario {
        path: Some(path.to_path_buf()),
        scenario,
    })
}

/// Keep scenarios whose name or tags match the filter
pub fn filter_scenarios(scenarios: Vec<LoadedScenario>, filter: Option<&str>) -> Vec<LoadedScenario> {
    match filter {
        Some(filter) => scenarios
            .into_iter()
            .filter(|s| s.scenario.matches_filter(filter))
            .collect(),
        None => scenarios,
    }
}

/// Runs a list of scenarios
pub struct Suite<'a> {
    runner: &'a ScenarioRunner,
    parallel: bool,
}

impl<'a> Suite<'a> {
    pub fn new(runner: &'a ScenarioRunner) -> Self {
        Self {
            runner,
            parallel: false,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run every scenario; reports come back in input order
    pub async fn run(&self, scenarios: &[LoadedScenario], env: &Environment) -> SuiteReport {
        let started = Instant::now();
        let reports = if self.parallel {
            self.run_lanes(scenarios, env).await
        } else {
            self.run_lane(scenarios.iter().enumerate().collect(), env.clone())
                .await
                .into_iter()
                .map(|(_, report)| report)
                .collect()
        };
        SuiteReport {
            reports,
            duration: started.elapsed(),
        }
    }

    async fn run_lanes(&self, scenarios: &[LoadedScenario], env: &Environment) -> Vec<ScenarioReport> {
        let mut shared = Vec::new();
        let mut groups: BTreeMap<&str, Vec<(usize, &LoadedScenario)>> = BTreeMap::new();
        for (index, loaded) in scenarios.iter().enumerate() {
            match loaded.scenario.group.as_deref() {
                Some(group) => groups.entry(group).or_default().push((index, loaded)),
                None => shared.push((index, loaded)),
            }
        }
        tracing::info!(
            lanes = groups.len() + usize::from(!shared.is_empty()),
            "Running scenarios in parallel lanes"
        );

        let mut lanes = vec![self.run_lane(shared, env.clone())];
        for (group, members) in groups {
            lanes.push(self.run_lane(members, env.isolated(group)));
        }

        let mut reports: Vec<(usize, ScenarioReport)> =
            join_all(lanes).await.into_iter().flatten().collect();
        reports.sort_by_key(|(index, _)| *index);
        reports.into_iter().map(|(_, report)| report).collect()
    }

    async fn run_lane(
        &self,
        members: Vec<(usize, &LoadedScenario)>,
        env: Environment,
    ) -> Vec<(usize, ScenarioReport)> {
        let mut reports = Vec::with_capacity(members.len());
        for (index, loaded) in members {
            let mut report = self.runner.run(&loaded.scenario, &env).await;
            report.path = loaded.path.clone();
            reports.push((index, report));
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "name: Events - Published\ntags: [cache]\nactions: [{method: GET, path: /events}]\n";
    const B: &str = "name: Box office\ngroup: boxoffice\nactions: [{method: GET, path: /cart}]\n";

    #[test]
    fn test_load_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), B).unwrap();
        std::fs::write(dir.path().join("a.yml"), A).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = load_scenarios(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = loaded.iter().map(|l| l.scenario.name.as_str()).collect();
        assert_eq!(names, vec!["Events - Published", "Box office"]);
        assert!(loaded[0].path.as_ref().unwrap().ends_with("a.yml"));

        let filtered = filter_scenarios(loaded, Some("cache"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].scenario.group, None);
    }

    #[test]
    fn test_invalid_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "name: [unclosed").unwrap();
        assert!(load_scenarios(&[dir.path().to_path_buf()]).is_err());
    }
}
