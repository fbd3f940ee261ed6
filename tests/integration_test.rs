use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use swiftinstall::export::{self, ConfigDocument, ConfigFormat};
use swiftinstall::{
    AdapterReport, BatchInstaller, EnvironmentManager, InstallOutcome, InstallRequest,
    InstallStatus, PackageDescriptor, PackageManager, Priority, ProcessEnvironment,
};

/// Adapter answering from a fixed table; unknown ids install fine
struct TableAdapter {
    outcomes: HashMap<String, InstallOutcome>,
    requests: Mutex<Vec<InstallRequest>>,
}

impl TableAdapter {
    fn new(outcomes: &[(&str, InstallOutcome)]) -> Self {
        Self {
            outcomes: outcomes
                .iter()
                .map(|(id, outcome)| (id.to_string(), outcome.clone()))
                .collect(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl PackageManager for TableAdapter {
    fn name(&self) -> &'static str {
        "table"
    }

    fn install(&self, request: &InstallRequest) -> AdapterReport {
        self.requests.lock().unwrap().push(request.clone());
        AdapterReport::new(
            self.outcomes
                .get(&request.id)
                .cloned()
                .unwrap_or(InstallOutcome::Installed),
        )
    }
}

#[derive(Default)]
struct CountingEnv {
    refreshes: AtomicUsize,
}

impl EnvironmentManager for CountingEnv {
    fn append_to_path(&self, _path: &str) -> bool {
        true
    }

    fn set_env(&self, _name: &str, _value: &str) -> bool {
        true
    }

    fn hot_refresh(&self) -> bool {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        true
    }
}

fn dev_toolchain() -> Vec<PackageDescriptor> {
    vec![
        PackageDescriptor::new("Git.Git", "Git").with_priority(Priority::Critical),
        PackageDescriptor::new("OpenJS.NodeJS", "Node.js")
            .with_version("20.11.0")
            .depends_on("Git.Git"),
        PackageDescriptor::new("Yarn.Yarn", "Yarn").depends_on("OpenJS.NodeJS"),
        PackageDescriptor::new("Docker.DockerDesktop", "Docker").with_priority(Priority::Low),
    ]
}

#[tokio::test]
async fn test_batch_with_failure_and_dependents() {
    let adapter = Arc::new(TableAdapter::new(&[(
        "OpenJS.NodeJS",
        InstallOutcome::Failed("Installer failed with exit code 1603".to_string()),
    )]));
    let env = Arc::new(CountingEnv::default());
    let mut installer = BatchInstaller::new(adapter.clone(), env.clone());

    let session = installer.install_all(&dev_toolchain(), true, false).await.unwrap();

    assert_eq!(session.status_of("Git.Git"), Some(InstallStatus::Success));
    assert_eq!(session.status_of("OpenJS.NodeJS"), Some(InstallStatus::Failed));
    assert_eq!(session.status_of("Yarn.Yarn"), Some(InstallStatus::Skipped));
    assert_eq!(session.status_of("Docker.DockerDesktop"), Some(InstallStatus::Success));
    assert_eq!(
        session.completed + session.failed + session.skipped,
        session.total_packages
    );
    assert_eq!(env.refreshes.load(Ordering::SeqCst), 1);

    let node = adapter
        .requests
        .lock()
        .unwrap()
        .iter()
        .find(|r| r.id == "OpenJS.NodeJS")
        .cloned()
        .unwrap();
    assert_eq!(node.version.as_deref(), Some("20.11.0"));
    assert!(node.non_interactive);

    let report = installer.get_session_report();
    assert!(report.contains("  [✗] Node.js"));
    assert!(report.contains("      Error: Installer failed with exit code 1603"));
    assert!(report.contains("      Error: Missing dependencies: OpenJS.NodeJS"));
}

#[tokio::test]
async fn test_config_document_drives_install() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("toolchain.json");
    export::write_config(&path, &ConfigDocument::new(dev_toolchain(), chrono::Utc::now())).unwrap();

    let loaded = export::read_config(&path).unwrap();
    assert_eq!(loaded.packages, dev_toolchain());

    let mut installer = BatchInstaller::new(
        Arc::new(TableAdapter::new(&[])),
        Arc::new(CountingEnv::default()),
    );
    let session = installer.install_all(&loaded.packages, false, false).await.unwrap();
    assert_eq!(session.completed, 4);
}

#[tokio::test]
async fn test_process_environment_profile_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let profile = dir.path().join("profile").join("swiftinstall.sh");
    let env = Arc::new(ProcessEnvironment::new().with_profile_path(&profile));

    let packages = vec![PackageDescriptor::new("Go.Go", "Go")
        .with_env_var("SWIFTINSTALL_IT_GOPATH", "/opt/go")
        .with_path_addition("/opt/swiftinstall-it/bin")];
    let mut installer = BatchInstaller::new(Arc::new(TableAdapter::new(&[])), env.clone());
    installer.install_all(&packages, true, false).await.unwrap();

    let written = std::fs::read_to_string(&profile).unwrap();
    assert!(written.contains("export SWIFTINSTALL_IT_GOPATH=\"/opt/go\""));
    assert!(written.contains("/opt/swiftinstall-it/bin"));
    assert_eq!(std::env::var("SWIFTINSTALL_IT_GOPATH").unwrap(), "/opt/go");
}

#[test]
fn test_blocking_caller() {
    let mut installer = BatchInstaller::new(
        Arc::new(TableAdapter::new(&[("Git.Git", InstallOutcome::AlreadyInstalled)])),
        Arc::new(CountingEnv::default()),
    );

    let session =
        tokio_test::block_on(installer.install_all(&dev_toolchain(), true, false)).unwrap();

    assert_eq!(session.already_installed(), 1);
    assert_eq!(session.completed, 4);
}

#[test]
fn test_yaml_package_list_defaults() {
    let yaml = r#"
packages:
  - id: ripgrep
    name: ripgrep
  - id: neovim
    name: Neovim
    priority: 1
    dependencies: [ripgrep]
"#;
    let doc = export::load_config(yaml, ConfigFormat::Yaml).unwrap();
    assert_eq!(doc.version, "1.0");
    assert_eq!(doc.packages[0].category, "Other");
    assert_eq!(doc.packages[1].priority, Priority::High);
    assert!(swiftinstall::validate_dependencies(&doc.packages).is_empty());
}
