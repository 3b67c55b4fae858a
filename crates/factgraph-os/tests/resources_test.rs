use factgraph_core::mock::MockProvider;
use factgraph_core::{Args, FactError, ProviderError, Registry, ResourceRef, Runtime, Value};
use factgraph_os::LocalProvider;
use std::sync::{Arc, Mutex};

fn runtime(mock: &Arc<MockProvider>) -> Runtime {
    factgraph_core::tracing::try_setup_tracing();
    let registry = Registry::new();
    factgraph_os::init(&registry).unwrap();
    Runtime::new(registry, mock.clone()).unwrap()
}

fn map(value: &Value) -> &std::collections::BTreeMap<String, Value> {
    value.as_map().unwrap()
}

const SSHD_CONFIG: &str = "\
# hardened
Port 22
PermitRootLogin no
PasswordAuthentication no
AllowUsers deploy
AllowUsers backup
";

#[test]
fn init_twice_is_a_duplicate() {
    let registry = Registry::new();
    factgraph_os::init(&registry).unwrap();
    assert!(matches!(
        factgraph_os::init(&registry),
        Err(FactError::DuplicateName(_))
    ));
}

#[test]
fn platform_fields_come_from_uname() {
    let mock = Arc::new(MockProvider::new());
    mock.expect_command("uname -s").return_ok("Linux\n");
    mock.expect_command("uname -r").return_ok("6.8.0-45-generic\n");
    mock.expect_command("uname -m").return_ok("x86_64\n");
    let rt = runtime(&mock);

    let platform = rt.create_resource("platform", Args::new()).unwrap();
    assert_eq!(rt.get_field(platform.as_ref(), "name").unwrap(), Value::from("Linux"));
    assert_eq!(
        rt.get_field(platform.as_ref(), "release").unwrap(),
        Value::from("6.8.0-45-generic")
    );
    assert_eq!(rt.get_field(platform.as_ref(), "arch").unwrap(), Value::from("x86_64"));
    mock.verify();
}

#[test]
fn platform_rejects_arguments() {
    let mock = Arc::new(MockProvider::new());
    let rt = runtime(&mock);
    let err = rt
        .create_resource("platform", Args::new().with("host", "db-01"))
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn kernel_shares_commands_with_platform() {
    let mock = Arc::new(MockProvider::new());
    mock.expect_command("uname -r").return_ok("6.1.0\n");
    mock.expect_command("sysctl -a")
        .return_ok("net.ipv4.ip_forward = 1\nkernel.randomize_va_space = 2\n");
    mock.add_file("/proc/modules", "ext4 737280 1 - Live 0x0\nloop 32768 0 - Live 0x0\n");
    let rt = runtime(&mock);

    let kernel = rt.create_resource("kernel", Args::new()).unwrap();
    let platform = rt.create_resource("platform", Args::new()).unwrap();

    assert_eq!(rt.get_field(kernel.as_ref(), "version").unwrap(), Value::from("6.1.0"));
    assert_eq!(rt.get_field(platform.as_ref(), "release").unwrap(), Value::from("6.1.0"));
    assert_eq!(mock.command_calls("uname -r"), 1);

    let params = rt.get_field(kernel.as_ref(), "parameters").unwrap();
    assert_eq!(map(&params)["net.ipv4.ip_forward"], Value::from("1"));

    let modules = rt.get_field(kernel.as_ref(), "modules").unwrap();
    let modules = modules.as_list().unwrap();
    assert_eq!(modules.len(), 2);
    assert_eq!(map(&modules[1])["name"], Value::from("loop"));
}

#[test]
fn failed_command_only_affects_its_dependents() {
    let mock = Arc::new(MockProvider::new());
    mock.expect_command("uname -s").return_ok("Linux\n");
    mock.expect_command("uname -m").return_status(127, "uname: not found");
    let rt = runtime(&mock);
    let platform = rt.create_resource("platform", Args::new()).unwrap();

    let err = rt.get_field(platform.as_ref(), "arch").unwrap_err();
    assert!(matches!(err, FactError::Provider(ProviderError::Io { ref message, .. })
        if message.contains("exit status 127")));
    // `uname -r` was never scripted
    assert!(matches!(
        rt.get_field(platform.as_ref(), "release"),
        Err(FactError::Provider(ProviderError::CommandNotFound(_)))
    ));
    assert_eq!(rt.get_field(platform.as_ref(), "name").unwrap(), Value::from("Linux"));
}

#[test]
fn sshd_config_chain_reaches_params() {
    let mock = Arc::new(MockProvider::new());
    mock.add_file("/etc/ssh/sshd_config", SSHD_CONFIG);
    let rt = runtime(&mock);
    let config = rt.create_resource("sshd.config", Args::new()).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    rt.watch_and_update(config.as_ref(), "params", "policy", move |v| {
        sink.lock().unwrap().push(v);
    })
    .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let params = seen[0].as_ref().unwrap();
    assert_eq!(map(params)["PermitRootLogin"], Value::from("no"));
    assert_eq!(map(params)["AllowUsers"], Value::from("deploy,backup"));

    assert_eq!(
        rt.get_field(config.as_ref(), "file").unwrap(),
        Value::Resource(ResourceRef::new("file", "/etc/ssh/sshd_config"))
    );
}

#[test]
fn sshd_params_are_computed_once() {
    let mock = Arc::new(MockProvider::new());
    mock.add_file("/etc/ssh/sshd_config", "PermitRootLogin no\n");
    let rt = runtime(&mock);
    let config = rt.create_resource("sshd.config", Args::new()).unwrap();

    let first = rt.get_field(config.as_ref(), "params").unwrap();
    mock.add_file("/etc/ssh/sshd_config", "PermitRootLogin yes\n");
    let again = rt.get_field(config.as_ref(), "params").unwrap();

    assert_eq!(map(&again)["PermitRootLogin"], Value::from("no"));
    assert_eq!(first, again);
    assert!(rt.observers().is_empty());
}

#[test]
fn sshd_config_with_custom_path() {
    let mock = Arc::new(MockProvider::new());
    mock.add_file("/srv/sshd_config", "Port 2222\n");
    let rt = runtime(&mock);
    let config = rt
        .create_resource("sshd.config", Args::new().with("path", "/srv/sshd_config"))
        .unwrap();

    assert_eq!(config.id().id, "/srv/sshd_config");
    let params = rt.get_field(config.as_ref(), "params").unwrap();
    assert_eq!(map(&params)["Port"], Value::from("2222"));
}

#[test]
fn sshd_config_missing_file_is_a_field_error() {
    let mock = Arc::new(MockProvider::new());
    let rt = runtime(&mock);
    let config = rt.create_resource("sshd.config", Args::new()).unwrap();

    let err = rt.get_field(config.as_ref(), "params").unwrap_err();
    assert!(matches!(err, FactError::Provider(ProviderError::FileNotFound(_))));
}

#[test]
fn sshd_parent_is_a_static_resource() {
    let mock = Arc::new(MockProvider::new());
    let rt = runtime(&mock);

    let sshd = rt.create_resource("sshd", Args::new()).unwrap();
    assert_eq!(
        rt.get_field(sshd.as_ref(), "config").unwrap(),
        Value::Resource(ResourceRef::new("sshd.config", ""))
    );
    assert!(rt.registry().resolve("sshd").unwrap().is_static());
}

#[test]
fn unregister_releases_the_sshd_chain() {
    let mock = Arc::new(MockProvider::new());
    mock.add_file("/etc/ssh/sshd_config", SSHD_CONFIG);
    let rt = runtime(&mock);
    let config = rt.create_resource("sshd.config", Args::new()).unwrap();

    rt.watch_and_update(config.as_ref(), "params", "policy", |_| {})
        .unwrap();
    assert!(!rt.observers().is_empty());

    rt.unregister("policy").unwrap();
    assert!(rt.observers().is_empty());
}

#[test]
fn users_are_read_from_passwd() {
    let mock = Arc::new(MockProvider::new());
    mock.add_file(
        "/etc/passwd",
        "root:x:0:0:root:/root:/bin/bash\nwww-data:x:33:33:www-data:/var/www:/usr/sbin/nologin\n",
    );
    let rt = runtime(&mock);
    let users = rt.create_resource("users", Args::new()).unwrap();

    let list = rt.get_field(users.as_ref(), "list").unwrap();
    let list = list.as_list().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(map(&list[1])["name"], Value::from("www-data"));
    assert_eq!(map(&list[1])["uid"], Value::Int(33));
    assert_eq!(map(&list[1])["shell"], Value::from("/usr/sbin/nologin"));
}

#[test]
fn file_metadata() {
    let mock = Arc::new(MockProvider::new());
    mock.add_file_with_mode("/etc/shadow", "root:*:19000::::::\n", 0o640);
    let rt = runtime(&mock);

    let shadow = rt
        .create_resource("file", Args::new().with("path", "/etc/shadow"))
        .unwrap();
    assert_eq!(rt.get_field(shadow.as_ref(), "exists").unwrap(), Value::Bool(true));
    assert_eq!(rt.get_field(shadow.as_ref(), "size").unwrap(), Value::Int(19));
    let perms = rt.get_field(shadow.as_ref(), "permissions").unwrap();
    assert_eq!(map(&perms)["string"], Value::from("rw-r-----"));

    let missing = rt
        .create_resource("file", Args::new().with("path", "/etc/nope"))
        .unwrap();
    assert_eq!(rt.get_field(missing.as_ref(), "exists").unwrap(), Value::Bool(false));
    assert!(rt.get_field(missing.as_ref(), "content").is_err());
}

#[test]
fn file_and_command_require_their_argument() {
    let mock = Arc::new(MockProvider::new());
    let rt = runtime(&mock);
    assert!(rt.create_resource("file", Args::new()).unwrap_err().is_validation());
    assert!(rt.create_resource("command", Args::new()).unwrap_err().is_validation());
}

#[test]
fn local_provider_reads_a_fixture_tree() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("etc")).unwrap();
    std::fs::write(dir.path().join("etc/passwd"), "alice:x:1000:1000::/home/alice:/bin/zsh\n")
        .unwrap();

    let registry = Registry::new();
    factgraph_os::init(&registry).unwrap();
    let rt = Runtime::new(registry, Arc::new(LocalProvider::with_root(dir.path()))).unwrap();

    let users = rt.create_resource("users", Args::new()).unwrap();
    let list = rt.get_field(users.as_ref(), "list").unwrap();
    assert_eq!(map(&list.as_list().unwrap()[0])["home"], Value::from("/home/alice"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_run_each_command_once() {
    let mock = Arc::new(MockProvider::new());
    mock.expect_command("uname -s").return_ok("Linux\n");
    let rt = runtime(&mock);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let rt = rt.clone();
            tokio::task::spawn_blocking(move || {
                let platform = rt.create_resource("platform", Args::new()).unwrap();
                rt.get_field(platform.as_ref(), "name")
            })
        })
        .collect();

    for task in tasks {
        match task.await.unwrap() {
            Ok(value) => assert_eq!(value, Value::from("Linux")),
            Err(e) => assert!(e.is_not_ready()),
        }
    }
    assert_eq!(mock.command_calls("uname -s"), 1);
}
