use std::io::Write;
use std::path::Path;

use flintrock::config::FileConfig;

const SAMPLE: &str = "\
launch:
  num-slaves: 8
  install-spark: true
  spark-version: \"1.5.0\"
modules:
  spark:
    version: \"1.5.0\"
providers:
  ec2:
    key-name: lab
    identity-file: /home/me/.ssh/lab.pem
    region: us-west-2
    instance-type: m3.large
    ebs-optimized: true
";

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_parses_all_blocks() {
    let file = write_config(SAMPLE);
    let config = FileConfig::from_file(file.path()).unwrap();

    assert_eq!(config.launch.num_slaves, Some(8));
    assert_eq!(config.launch.install_spark, Some(true));
    assert_eq!(config.modules.spark.version.as_deref(), Some("1.5.0"));
    assert_eq!(config.providers.ec2.region.as_deref(), Some("us-west-2"));
    assert_eq!(config.providers.ec2.key_name.as_deref(), Some("lab"));
    assert_eq!(config.providers.ec2.ebs_optimized, Some(true));
}

#[test]
fn test_missing_blocks_default_to_empty() {
    let file = write_config("launch:\n  num-slaves: 2\n");
    let config = FileConfig::from_file(file.path()).unwrap();

    assert_eq!(config.launch.num_slaves, Some(2));
    assert_eq!(config.launch.spark_version, None);
    assert_eq!(config.providers.ec2.region, None);
}

#[test]
fn test_missing_user_specified_path_is_an_error() {
    let result = FileConfig::load(Some(Path::new("/definitely/not/here/config.yaml")));
    assert!(result.is_err());
}

#[test]
fn test_load_explicit_path_reads_the_file() {
    let file = write_config(SAMPLE);
    let config = FileConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.launch.num_slaves, Some(8));
}

#[test]
fn test_malformed_yaml_is_an_error() {
    let file = write_config("launch: [not, a, mapping\n");
    assert!(FileConfig::from_file(file.path()).is_err());
}
