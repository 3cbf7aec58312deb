//! 配置文件读写测试

use merlin_client::{ClientBuilder, MerlinConfig};
use std::io::Write;

#[test]
fn test_save_and_load() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("merlin.toml");

    let mut config = MerlinConfig::default();
    config.connection.host = "192.168.0.10".to_string();
    config.connection.simulated = true;
    config.acquisition.threshold0 = 200.0;
    config.acquisition.frame_count = 65792;
    config.save_to_file(&path)?;

    let loaded = MerlinConfig::load_from_file(&path)?;
    assert_eq!(loaded, config);
    Ok(())
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(MerlinConfig::load_from_file(dir.path().join("missing.toml")).is_err());
}

#[test]
fn test_builder_from_config_file() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
[connection]
host = "detector.local"
command_port = 16341
simulated = true
settle_delay_ms = 0
"#
    )?;

    let config = MerlinConfig::load_from_file(file.path())?;
    let client = ClientBuilder::from_config(&config).build()?;
    assert_eq!(
        client.to_string(),
        "<CommandClient, detector.local:16341> (simulated)"
    );
    client.start_acquisition_with(&config.acquisition)?;
    Ok(())
}
