use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use azure_tf_harness::config::{create_sample_config, load_settings, HarnessSettings};
use azure_tf_harness::env::validate_required_env_vars;
use azure_tf_harness::error::ConfigError;
use azure_tf_harness::harness::{DestroyOutcome, Harness, ProvisioningRequest, TeardownPolicy};
use azure_tf_harness::naming::generate_unique_name;
use azure_tf_harness::terraform::{TerraformCli, TerraformEngine, TerraformOptions};
use azure_tf_harness::Outputs;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("azure-tf-harness")
        .version("0.1.0")
        .about("Operator tooling for the Azure Terraform module test harness")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Harness settings file")
                .global(true),
        )
        .arg(
            Arg::new("terraform")
                .long("terraform")
                .value_name("PATH")
                .help("Terraform binary to run")
                .global(true),
        )
        .arg(
            Arg::new("fixtures-dir")
                .long("fixtures-dir")
                .value_name("DIR")
                .help("Root directory of the module fixtures")
                .global(true),
        )
        .subcommand(Command::new("check-env").about("Verify the Azure credential variables are set"))
        .subcommand(
            Command::new("unique-name")
                .about("Print a collision-resistant resource name")
                .arg(Arg::new("prefix").required(true).value_name("PREFIX")),
        )
        .subcommand(
            Command::new("sample-config")
                .about("Write a settings file with every default filled in")
                .arg(Arg::new("path").required(true).value_name("PATH")),
        )
        .subcommand(
            Command::new("outputs")
                .about("Print the outputs of an applied module")
                .arg(dir_arg()),
        )
        .subcommand(
            Command::new("destroy")
                .about("Tear down a module left behind by an interrupted test run")
                .arg(dir_arg())
                .arg(
                    Arg::new("var")
                        .long("var")
                        .value_name("NAME=VALUE")
                        .help("Input variable, repeatable; JSON values are parsed")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("attempts")
                        .long("attempts")
                        .value_name("NUMBER")
                        .help("Destroy attempts [default: destroy_attempts setting]")
                        .value_parser(clap::value_parser!(u32).range(1..)),
                )
                .arg(
                    Arg::new("delay-secs")
                        .long("delay-secs")
                        .value_name("SECONDS")
                        .help("Delay between attempts [default: destroy_delay_secs setting]")
                        .value_parser(clap::value_parser!(f64)),
                ),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let settings = load_settings(config_path.map(|s| s.as_str()), &matches)?;

    match matches.subcommand() {
        Some(("check-env", _)) => {
            validate_required_env_vars()?;
            println!("All required environment variables are set");
        }
        Some(("unique-name", sub)) => {
            let prefix = required(sub, "prefix")?;
            println!("{}", generate_unique_name(prefix));
        }
        Some(("sample-config", sub)) => {
            create_sample_config(required(sub, "path")?)?;
        }
        Some(("outputs", sub)) => print_outputs(&settings, required(sub, "dir")?).await?,
        Some(("destroy", sub)) => destroy(settings, sub).await?,
        Some((other, _)) => bail!("Unknown subcommand: {other}"),
        None => bail!("No subcommand given"),
    }

    Ok(())
}

fn dir_arg() -> Arg {
    Arg::new("dir")
        .short('d')
        .long("dir")
        .value_name("DIR")
        .help("Terraform module directory")
        .required(true)
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .with_context(|| format!("Missing required argument: {id}"))
}

async fn print_outputs(settings: &HarnessSettings, dir: &str) -> Result<()> {
    let engine = TerraformCli::new(settings.terraform_binary.clone());
    let mut options = TerraformOptions::new(dir);
    options.no_color = settings.no_color;

    let document = engine
        .output_all(&options)
        .await
        .with_context(|| format!("Failed to read outputs of {dir}"))?;

    let outputs = Outputs::from_json(&document)?;
    for name in outputs.names() {
        println!("{name} = {}", outputs.output_json(name)?);
    }
    Ok(())
}

async fn destroy(settings: HarnessSettings, matches: &ArgMatches) -> Result<()> {
    let dir = required(matches, "dir")?;
    let mut vars = Map::new();
    if let Some(values) = matches.get_many::<String>("var") {
        for raw in values {
            let (name, value) = parse_var(raw)?;
            vars.insert(name, value);
        }
    }

    let attempts = matches
        .get_one::<u32>("attempts")
        .copied()
        .unwrap_or(settings.destroy_attempts);
    let delay = match matches.get_one::<f64>("delay-secs") {
        Some(secs) => delay_from_secs(*secs)?,
        None => settings.destroy_delay(),
    };

    let request = ProvisioningRequest::new(dir)
        .vars(vars)
        .no_color(settings.no_color)
        .teardown(TeardownPolicy::Retry { attempts, delay });

    let harness = Harness::new(
        Arc::new(TerraformCli::new(settings.terraform_binary.clone())),
        settings,
    );

    match harness.destroy(request).await {
        DestroyOutcome::Destroyed { attempts } => {
            info!("Destroyed {dir} after {attempts} attempt(s)");
            Ok(())
        }
        DestroyOutcome::Failed { attempts, error } => {
            bail!("Destroy of {dir} failed after {attempts} attempt(s): {error}")
        }
    }
}

fn delay_from_secs(secs: f64) -> Result<Duration> {
    if secs < 0.0 {
        bail!("--delay-secs must be >= 0, got {secs}");
    }
    Duration::try_from_secs_f64(secs)
        .with_context(|| format!("--delay-secs is not a usable number of seconds: {secs}"))
}

/// Parses `name=value`, reading the value as JSON when it is valid JSON and as
/// a plain string otherwise.
fn parse_var(raw: &str) -> Result<(String, Value), ConfigError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
            Ok((name.trim().to_string(), value))
        }
        _ => Err(ConfigError::InvalidValue {
            name: "--var".to_string(),
            value: raw.to_string(),
            reason: "expected NAME=VALUE".to_string(),
        }),
    }
}
