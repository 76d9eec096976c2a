//! CLI command handling
//!
//! Loads configuration, wires the harness together and prints results.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use serde_json::Value;

use crate::commands::{Commands, ConnectionArgs};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::env::{render_value, Environment};
use crate::fixture::{load_fixture_dir, Orchestrator, Params};
use crate::http::HttpClient;
use crate::scenario::{check_scenarios, filter_scenarios, load_scenarios, ScenarioRunner, Suite};

const DEFAULT_SCENARIO_DIR: &str = "scenarios";

/// Everything a command needs to talk to the API
struct Harness {
    config: Config,
    env: Environment,
    orchestrator: Arc<Orchestrator>,
}

impl Harness {
    fn connect(args: &ConnectionArgs) -> Result<Self> {
        let mut config = Config::load(args.config.as_deref())?;
        if let Some(server) = &args.server {
            config.server.base_url = server.clone();
        }

        let env = Environment::new();
        config.seed(&env)?;

        let client = HttpClient::from_config(&config)?;
        let mut orchestrator = Orchestrator::with_builtin(client);
        if let Some(dir) = &args.fixtures {
            for fixture in load_fixture_dir(dir)? {
                orchestrator.register(fixture);
            }
        }

        tracing::debug!(
            server = %config.server.base_url,
            fixtures = orchestrator.fixtures().len(),
            "Harness ready"
        );
        Ok(Self {
            config,
            env,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            paths,
            connection,
            filter,
            parallel,
            verbose,
        } => {
            let harness = Harness::connect(&connection)?;
            let scenarios = filter_scenarios(
                load_scenarios(&scenario_paths(paths))?,
                filter.as_deref(),
            );
            if scenarios.is_empty() {
                println!("No scenarios to run");
                return Ok(());
            }

            let runner = ScenarioRunner::from_config(harness.orchestrator.clone(), &harness.config);
            let suite = Suite::new(&runner)
                .parallel(parallel || harness.config.runner.parallel)
                .run(&scenarios, &harness.env)
                .await;

            for report in &suite.reports {
                report.print(verbose);
            }
            suite.print_summary();

            if suite.all_passed() {
                Ok(())
            } else {
                Err(Error::AssertionFailure(format!(
                    "{} of {} scenarios failed",
                    suite.failed(),
                    suite.reports.len()
                )))
            }
        }

        Commands::Check { paths, connection } => {
            let harness = Harness::connect(&connection)?;
            let scenarios = load_scenarios(&scenario_paths(paths))?;
            let seeded: HashSet<String> = harness.env.snapshot().into_keys().collect();

            let findings = check_scenarios(&scenarios, &seeded, &harness.orchestrator);
            if findings.is_empty() {
                println!("{} {} scenarios OK", "✓".green(), scenarios.len());
                return Ok(());
            }
            for finding in &findings {
                println!("  {} {}", "✗".red(), finding);
            }
            Err(Error::Config(format!(
                "{} problem(s) found in scenarios",
                findings.len()
            )))
        }

        Commands::Fixtures { fixtures } => {
            let harness = Harness::connect(&ConnectionArgs {
                fixtures,
                ..Default::default()
            })?;
            for fixture in harness.orchestrator.fixtures() {
                println!("{}", fixture.name().bold());
                if !fixture.description().is_empty() {
                    println!("  {}", fixture.description().dimmed());
                }
                let requires = fixture.required_keys();
                if !requires.is_empty() {
                    println!("  requires: {}", requires.join(", "));
                }
                println!("  outputs:  {}", fixture.outputs().join(", "));
            }
            Ok(())
        }

        Commands::Fixture {
            name,
            params,
            connection,
            verbose: _,
        } => {
            let harness = Harness::connect(&connection)?;
            let params = parse_params(&params)?;
            let outputs = harness
                .orchestrator
                .run(&harness.env, &name, params)
                .await?;

            println!("{} {}", "✓".green(), name.bold());
            for (key, value) in outputs.iter() {
                println!("  {} = {}", key, render_value(value));
            }
            Ok(())
        }
    }
}

fn scenario_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    if paths.is_empty() {
        vec![PathBuf::from(DEFAULT_SCENARIO_DIR)]
    } else {
        paths
    }
}

/// Parse `key=value` pairs; values that are valid JSON keep their type
fn parse_params(raw: &[String]) -> Result<Params> {
    let mut params = Params::new();
    for item in raw {
        let (key, value) = item.split_once('=').ok_or_else(|| {
            Error::Config(format!("Invalid parameter '{}', expected key=value", item))
        })?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        params.insert(key.trim().to_string(), value);
    }
    Ok(params)
}
