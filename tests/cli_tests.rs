use advisor_client::cli::{Cli, Commands};
use advisor_client::retry::RetryConfig;
use anyhow::Result;
use clap::Parser;
use reqwest::Method;
use std::io::Write;

#[test]
fn test_cli_defaults() -> Result<()> {
    let cli = Cli::try_parse_from(["advisor-client", "get", "/api/programmes"])?;

    match &cli.command {
        Commands::Get { path } => assert_eq!(path, "/api/programmes"),
        _ => panic!("Expected Get command"),
    }
    assert_eq!(cli.base_url, "http://localhost:5000");
    assert_eq!(cli.timeout_ms, 10000);
    assert!(cli.token_file.is_none());
    assert!(!cli.json);
    assert_eq!(cli.retry_config()?, RetryConfig::default());
    Ok(())
}

#[test]
fn test_cli_post_with_body() -> Result<()> {
    let cli = Cli::try_parse_from([
        "advisor-client",
        "--base-url",
        "https://advisor.example.edu",
        "post",
        "/api/chat",
        "--data",
        r#"{"message":"hi"}"#,
    ])?;

    assert_eq!(cli.command.method(), Method::POST);
    assert_eq!(cli.command.path(), "/api/chat");
    assert_eq!(cli.command.data(), Some(r#"{"message":"hi"}"#));
    assert_eq!(cli.base_url, "https://advisor.example.edu");
    Ok(())
}

#[test]
fn test_cli_retry_overrides() -> Result<()> {
    let cli = Cli::try_parse_from([
        "advisor-client",
        "--max-retries",
        "2",
        "--base-delay-ms",
        "200",
        "--max-delay-ms",
        "4000",
        "--jitter",
        "0.1",
        "--retry-status",
        "502",
        "--retry-status",
        "503",
        "--retry-network-errors",
        "delete",
        "/api/trajectory/events/3",
    ])?;

    let config = cli.retry_config()?;
    assert_eq!(config.max_retries, 2);
    assert_eq!(config.base_delay_ms, 200);
    assert_eq!(config.max_delay_ms, 4000);
    assert_eq!(config.jitter_factor, 0.1);
    assert_eq!(
        config.retryable_status_codes.into_iter().collect::<Vec<_>>(),
        vec![429, 502, 503]
    );
    assert!(config.retry_network_errors);
    assert_eq!(cli.command.method(), Method::DELETE);
    assert_eq!(cli.command.data(), None);
    Ok(())
}

#[test]
fn test_cli_conservative_preset() -> Result<()> {
    let cli = Cli::try_parse_from(["advisor-client", "--conservative", "get", "/api/programmes"])?;
    assert_eq!(cli.retry_config()?, RetryConfig::conservative());
    Ok(())
}

#[test]
fn test_cli_retry_config_file() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, r#"{{ "max_retries": 1, "retryable_status_codes": [429, 500] }}"#)?;

    let path = file.path().to_str().unwrap().to_string();
    let cli = Cli::try_parse_from([
        "advisor-client",
        "--retry-config",
        path.as_str(),
        "--max-delay-ms",
        "2000",
        "get",
        "/api/programmes",
    ])?;

    let config = cli.retry_config()?;
    assert_eq!(config.max_retries, 1);
    assert_eq!(config.max_delay_ms, 2000);
    assert_eq!(config.base_delay_ms, 1000);
    assert!(config.retryable_status_codes.contains(&500));
    Ok(())
}

#[test]
fn test_cli_config_file_layers_over_conservative_preset() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, r#"{{ "jitter_factor": 0.1 }}"#)?;

    let path = file.path().to_str().unwrap().to_string();
    let cli = Cli::try_parse_from([
        "advisor-client",
        "--conservative",
        "--retry-config",
        path.as_str(),
        "--max-retries",
        "1",
        "get",
        "/api/programmes",
    ])?;

    let config = cli.retry_config()?;
    let preset = RetryConfig::conservative();
    assert_eq!(config.max_retries, 1);
    assert_eq!(config.base_delay_ms, preset.base_delay_ms);
    assert_eq!(config.max_delay_ms, preset.max_delay_ms);
    assert_eq!(config.jitter_factor, 0.1);
    Ok(())
}

#[test]
fn test_cli_rejects_unknown_config_file_fields() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, r#"{{ "max_retry": 1 }}"#)?;

    let path = file.path().to_str().unwrap().to_string();
    let cli = Cli::try_parse_from(["advisor-client", "--retry-config", path.as_str(), "get", "/"])?;
    assert!(cli.retry_config().is_err());
    Ok(())
}

#[test]
fn test_cli_rejects_invalid_retry_settings() -> Result<()> {
    let cli = Cli::try_parse_from([
        "advisor-client",
        "--jitter",
        "1.5",
        "get",
        "/api/programmes",
    ])?;
    assert!(cli.retry_config().is_err());

    let cli = Cli::try_parse_from([
        "advisor-client",
        "--base-delay-ms",
        "5000",
        "--max-delay-ms",
        "100",
        "get",
        "/api/programmes",
    ])?;
    assert!(cli.retry_config().is_err());
    Ok(())
}

#[test]
fn test_cli_requires_subcommand() {
    assert!(Cli::try_parse_from(["advisor-client"]).is_err());
    assert!(Cli::try_parse_from(["advisor-client", "get"]).is_err());
}
