//! CLI command handling
//!
//! Dispatches CLI commands and formats their output.

use colored::Colorize;

use crate::commands::Commands;
use crate::common::{logging, Config, Result};
use crate::logscan::LogClassifier;
use crate::process;
use crate::runner::{self, InstallMode, RunOptions};
use crate::suite::load_suite;

/// Dispatch a CLI command; returns whether the command succeeded
pub async fn dispatch(command: Commands) -> Result<bool> {
    match command {
        Commands::Run {
            suite,
            component,
            install,
            force_install,
            iterate,
            only,
            config,
        } => {
            // The global subscriber starts once the run directory exists
            let config = logging::with_cli(|| Config::load(config.as_deref()))?;
            let install = if force_install {
                InstallMode::Force
            } else if install {
                InstallMode::Install
            } else {
                InstallMode::Skip
            };

            let outcome = runner::run_suite(RunOptions {
                suite,
                component,
                config,
                install,
                iterate,
                only,
                log_to_run_dir: true,
            })
            .await?;

            Ok(outcome.passed)
        }

        Commands::Validate {
            suite,
            component,
            config,
        } => {
            logging::init_cli();
            let config = Config::load(config.as_deref())?;
            let suite = load_suite(&suite, component, &config)?;

            println!(
                "{} {} {}",
                "Suite:".blue().bold(),
                suite.name.white().bold(),
                format!("[{}]", component).dimmed()
            );
            if let Some(desc) = &suite.description {
                println!("  {}", desc.dimmed());
            }
            match suite.executable() {
                Some(exe) => println!("  Executable: {}", exe.display()),
                None => println!("  Executable: {}", "(none)".dimmed()),
            }
            if let Some(build) = &suite.environment.build {
                println!("  Build:      {}", build);
            }
            println!("  Results:    {}", suite.environment.results_dir.display());
            println!();

            for (i, test) in suite.tests.iter().enumerate() {
                println!(
                    "  {:>2}. {} {}",
                    i + 1,
                    test.name.white().bold(),
                    format!("({}, block {})", test.kind.as_str(), test.block).dimmed()
                );
                if let Some(script) = &test.script {
                    println!("      script: {}", script.display());
                }
                let f = &test.flags;
                let mut flags = Vec::new();
                if f.retry_on_failure {
                    flags.push("retry");
                }
                if f.record_screen {
                    flags.push(if f.recording_required {
                        "record (required)"
                    } else {
                        "record"
                    });
                }
                if f.collect_vram {
                    flags.push("vram");
                }
                if f.collect_memory {
                    flags.push("memory");
                }
                if f.kill_existing {
                    flags.push("kill-existing");
                }
                if f.skip_block_on_freeze {
                    flags.push("skip-block-on-freeze");
                }
                if !flags.is_empty() {
                    println!("      flags: {}", flags.join(", ").dimmed());
                }
            }

            println!("\n{} {} test(s)", "✓".green(), suite.tests.len());
            Ok(true)
        }

        Commands::Classify { log, config } => {
            logging::init_cli();
            let config = Config::load(config.as_deref())?;
            let classifier = LogClassifier::from_config(&config.log_classification);
            let summary = classifier.scan_file(&log).await?;

            println!(
                "{}: {} lines, {} errors, {} warnings",
                log.display(),
                summary.lines,
                summary.errors.to_string().red(),
                summary.warnings.to_string().yellow()
            );
            if !summary.error_lines.is_empty() {
                println!("\n{}", "Errors:".red().bold());
                for line in &summary.error_lines {
                    println!("  {}", line);
                }
            }
            if !summary.warning_lines.is_empty() {
                println!("\n{}", "Warnings:".yellow().bold());
                for line in &summary.warning_lines {
                    println!("  {}", line);
                }
            }

            Ok(!(config.log_classification.fail_on_error && summary.errors > 0))
        }

        Commands::Kill { component, config } => {
            logging::init_cli();
            let config = Config::load(config.as_deref())?;
            let settings = config.component(component);

            if process::kill_by_name(&settings.process_name).await? {
                println!("{} killed {}", "✓".green(), settings.process_name);
            } else {
                println!("No running {} found", settings.process_name);
            }
            Ok(true)
        }
    }
}
