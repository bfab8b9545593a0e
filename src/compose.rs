//! Parameters + facts -> desired-state graph
//!
//! Composition is a pure function: it reads nothing from the host and the
//! same inputs always produce the same graph. The role is declared in
//! stages. Each stage is closed by an `include` anchor; every member of a
//! stage runs after the previous anchor and before its own, which orders
//! the stages strictly while leaving members of one stage free to run in
//! parallel.

use crate::config::Parameters;
use crate::error::ComposeError;
use crate::platform::{Capabilities, PlatformFacts};
use declarative::{Attributes, DesiredStateGraph, Ensure, Identity, ResourceKind};

pub const ROLE: &str = "confcollect";
pub const STAGE_ACCOUNTS: &str = "confcollect::accounts";
pub const STAGE_INSTALL: &str = "confcollect::install";
pub const STAGE_FILES: &str = "confcollect::config::files";
pub const STAGE_GIT: &str = "confcollect::config::git";
pub const STAGE_REPO: &str = "confcollect::config::repo";
pub const STAGE_GETCONFS: &str = "confcollect::config::getconfs";
pub const STAGE_LOG: &str = "confcollect::config::log";

pub const GETCONFS_JOB: &str = "getconfs";

/// Paths derived from the parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub home: String,
    pub venv: String,
    pub ssh_dir: String,
    pub ssh_key: String,
    pub gitconfig: String,
    pub script: String,
    pub settings_file: String,
    pub lib_python: String,
    pub log_dir: String,
    pub logrotate: String,
}

impl Layout {
    pub fn new(params: &Parameters) -> Self {
        let home = params.home();
        Self {
            venv: format!("{home}/venv"),
            ssh_dir: format!("{home}/.ssh"),
            ssh_key: format!("{home}/.ssh/id_rsa"),
            gitconfig: format!("{home}/.gitconfig"),
            script: format!("{home}/bin/getconfs.py"),
            settings_file: format!("{home}/etc/getconfs.json"),
            lib_python: format!("{home}/lib/python"),
            log_dir: params.log_dir(),
            logrotate: format!("/etc/logrotate.d/{}", params.user),
            home,
        }
    }

    /// Service account directories, parents first
    pub fn directories(&self) -> Vec<(String, u32)> {
        let home = &self.home;
        vec![
            (format!("{home}/bin"), 0o755),
            (format!("{home}/etc"), 0o755),
            (format!("{home}/src"), 0o755),
            (format!("{home}/staging"), 0o755),
            (format!("{home}/lib"), 0o755),
            (self.lib_python.clone(), 0o755),
            (self.ssh_dir.clone(), 0o700),
            (self.log_dir.clone(), 0o755),
        ]
    }

    pub fn checkout(&self, name: &str) -> String {
        format!("{}/src/{name}", self.home)
    }

    pub fn helper_library(&self, name: &str) -> String {
        format!("{}/{name}.py", self.lib_python)
    }
}

/// Build the desired-state graph for the role
pub fn compose(
    params: &Parameters,
    facts: &PlatformFacts,
) -> Result<DesiredStateGraph, ComposeError> {
    let capabilities = Capabilities::for_family(&facts.os_family)?;
    params.validate()?;

    log::debug!(
        "Composing {ROLE} for {} ({} {})",
        facts.os_family,
        facts.kernel,
        facts.architecture
    );

    let mut composer = Composer::new(params, &capabilities);
    composer.accounts()?;
    composer.install()?;
    composer.files()?;
    composer.git()?;
    composer.repos()?;
    if params.enable_getconfs {
        composer.getconfs()?;
    }
    composer.log()?;
    composer.finish()
}

pub fn user_identity(params: &Parameters) -> Identity {
    Identity::new(ResourceKind::User, &params.user)
}

pub fn anchor(stage: &str) -> Identity {
    Identity::new(ResourceKind::Include, stage)
}

struct Composer<'a> {
    params: &'a Parameters,
    capabilities: &'a Capabilities,
    layout: Layout,
    graph: DesiredStateGraph,
    previous_anchor: Option<Identity>,
    members: Vec<Identity>,
}

impl<'a> Composer<'a> {
    fn new(params: &'a Parameters, capabilities: &'a Capabilities) -> Self {
        Self {
            params,
            capabilities,
            layout: Layout::new(params),
            graph: DesiredStateGraph::new(),
            previous_anchor: None,
            members: Vec::new(),
        }
    }

    /// Declare a member of the current stage
    fn declare(
        &mut self,
        identity: Identity,
        attributes: Attributes,
    ) -> Result<Identity, ComposeError> {
        self.graph.define_resource(identity.clone(), attributes)?;
        if let Some(previous) = &self.previous_anchor {
            self.graph.add_edge(previous, &identity)?;
        }
        self.members.push(identity.clone());
        Ok(identity)
    }

    fn edge(&mut self, before: &Identity, after: &Identity) -> Result<(), ComposeError> {
        self.graph.add_edge(before, after)?;
        Ok(())
    }

    fn close_stage(&mut self, stage: &str) -> Result<(), ComposeError> {
        let stage_anchor = anchor(stage);
        self.graph
            .define_resource(stage_anchor.clone(), Attributes::new(Ensure::Present))?;

        if let Some(previous) = self.previous_anchor.take() {
            self.graph.add_edge(&previous, &stage_anchor)?;
        }
        for member in std::mem::take(&mut self.members) {
            self.graph.add_edge(&member, &stage_anchor)?;
        }

        self.previous_anchor = Some(stage_anchor);
        Ok(())
    }

    fn user(&self) -> &str {
        &self.params.user
    }

    fn accounts(&mut self) -> Result<(), ComposeError> {
        let attributes = Attributes::new(Ensure::Present)
            .param("comment", "Configuration Collector Role")
            .param("password", "!!")
            .param("purge_sshkeys", "true")
            .param("system", "true")
            .param("shell", "/bin/bash")
            .param("membership", "inclusive")
            .param("home", self.layout.home.clone());
        let user = user_identity(self.params);
        self.declare(user, attributes)?;
        self.close_stage(STAGE_ACCOUNTS)
    }

    fn install(&mut self) -> Result<(), ComposeError> {
        let params = self.params;
        let capabilities = self.capabilities;
        let manager = capabilities.package_manager.as_str();
        let git = self.declare(anchor("git"), Attributes::new(Ensure::Present))?;
        let python = self.declare(anchor("python"), Attributes::new(Ensure::Present))?;

        for &name in &capabilities.git_packages {
            let package = self.declare(
                Identity::new(ResourceKind::Package, name),
                Attributes::new(Ensure::Present).provider(manager),
            )?;
            self.edge(&package, &git)?;
        }
        for &name in &capabilities.python_packages {
            let package = self.declare(
                Identity::new(ResourceKind::Package, name),
                Attributes::new(Ensure::Present).provider(manager),
            )?;
            self.edge(&package, &python)?;
        }
        for &name in &capabilities.tool_packages {
            self.declare(
                Identity::new(ResourceKind::Package, name),
                Attributes::new(Ensure::Present).provider(manager),
            )?;
        }

        let user = self.user().to_string();
        for name in &params.python_packages {
            let attributes = Attributes::new(Ensure::Present)
                .provider("pip")
                .owned_by(&user)
                .param("virtualenv", self.layout.venv.clone())
                .param("python", capabilities.python);
            let package = self.declare(Identity::new(ResourceKind::PipPackage, name), attributes)?;
            self.edge(&python, &package)?;
        }

        self.close_stage(STAGE_INSTALL)
    }

    fn files(&mut self) -> Result<(), ComposeError> {
        let user = self.user().to_string();
        let mut declared: Vec<Identity> = Vec::new();
        for (path, mode) in self.layout.directories() {
            let dir = self.declare(
                Identity::new(ResourceKind::Directory, &path),
                Attributes::new(Ensure::Directory).owned_by(&user).mode(mode),
            )?;
            // parents before children
            for parent in &declared {
                if path.starts_with(&format!("{}/", parent.name)) {
                    self.graph.add_edge(parent, &dir)?;
                }
            }
            declared.push(dir);
        }

        let key = self.declare(
            Identity::new(ResourceKind::File, self.layout.ssh_key.clone()),
            Attributes::new(Ensure::File)
                .owned_by(&user)
                .mode(0o600)
                .content(self.params.ssh_id.clone()),
        )?;
        self.edge(&Identity::new(ResourceKind::Directory, self.layout.ssh_dir.clone()), &key)?;

        self.close_stage(STAGE_FILES)
    }

    fn git(&mut self) -> Result<(), ComposeError> {
        let user = self.user().to_string();
        let content = gitconfig(&self.params.git_user_name, &self.params.git_user_email());
        self.declare(
            Identity::new(ResourceKind::File, self.layout.gitconfig.clone()),
            Attributes::new(Ensure::File)
                .owned_by(&user)
                .mode(0o644)
                .content(content),
        )?;
        self.close_stage(STAGE_GIT)
    }

    fn repos(&mut self) -> Result<(), ComposeError> {
        let params = self.params;
        let user_id = user_identity(params);
        let user = self.user().to_string();
        for (name, entry) in &params.repos {
            let mut attributes = Attributes::new(entry.ensure())
                .source(entry.source())
                .provider("git")
                .owned_by(&user)
                .param("identity_file", self.layout.ssh_key.clone());
            if let Some(revision) = entry.revision() {
                attributes = attributes.param("revision", revision);
            }
            let repo = self.declare(
                Identity::new(ResourceKind::VcsRepo, self.layout.checkout(name)),
                attributes,
            )?;
            self.edge(&user_id, &repo)?;
        }
        self.close_stage(STAGE_REPO)
    }

    fn getconfs(&mut self) -> Result<(), ComposeError> {
        let params = self.params;
        let user = self.user().to_string();
        let files_dir = &params.files_dir;

        let settings = self.declare(
            Identity::new(ResourceKind::File, self.layout.settings_file.clone()),
            Attributes::new(Ensure::File)
                .owned_by(&user)
                .mode(0o600)
                .content(params.getconfs_settings.render()?),
        )?;

        let mut prerequisites = vec![settings];
        for lib in &params.helper_libraries {
            let library = self.declare(
                Identity::new(ResourceKind::File, self.layout.helper_library(lib)),
                Attributes::new(Ensure::File)
                    .owned_by(&user)
                    .mode(0o600)
                    .content_source(files_dir.join(format!("{lib}.py"))),
            )?;
            prerequisites.push(library);
        }

        let script = self.declare(
            Identity::new(ResourceKind::File, self.layout.script.clone()),
            Attributes::new(Ensure::File)
                .owned_by(&user)
                .mode(0o700)
                .content_source(files_dir.join("getconfs.py")),
        )?;
        prerequisites.push(script);

        let schedule = &params.getconfs_schedule;
        log::debug!("Scheduling {GETCONFS_JOB} at '{}'", schedule.expression());
        let mut job = Attributes::new(Ensure::Present)
            .param("user", user.clone())
            .param("command", self.getconfs_command());
        for (field, value) in schedule.fields() {
            job = job.param(field, value);
        }
        let cron = self.declare(Identity::new(ResourceKind::Cron, GETCONFS_JOB), job)?;
        for prerequisite in &prerequisites {
            self.edge(prerequisite, &cron)?;
        }

        self.close_stage(STAGE_GETCONFS)
    }

    fn getconfs_command(&self) -> String {
        let args = self.params.getconfs_args.trim();
        if args.is_empty() {
            format!("{} --ini {}", self.layout.script, self.layout.settings_file)
        } else {
            format!(
                "{} {args} --ini {}",
                self.layout.script, self.layout.settings_file
            )
        }
    }

    fn log(&mut self) -> Result<(), ComposeError> {
        self.declare(
            Identity::new(ResourceKind::File, self.layout.logrotate.clone()),
            Attributes::new(Ensure::File)
                .owned_by("root")
                .mode(0o644)
                .content(logrotate(&self.layout.log_dir, self.user())),
        )?;
        self.close_stage(STAGE_LOG)
    }

    fn finish(mut self) -> Result<DesiredStateGraph, ComposeError> {
        self.close_stage(ROLE)?;
        self.graph.validate()?;
        log::debug!(
            "Composed {} resources with {} edges",
            self.graph.len(),
            self.graph.edge_count()
        );
        Ok(self.graph)
    }
}

fn gitconfig(name: &str, email: &str) -> String {
    format!("[user]\n\tname = {name}\n\temail = {email}\n[push]\n\tdefault = simple\n")
}

fn logrotate(log_dir: &str, user: &str) -> String {
    format!(
        concat!(
            "{log_dir}/*.log {{\n",
            "    weekly\n",
            "    rotate 8\n",
            "    compress\n",
            "    delaycompress\n",
            "    missingok\n",
            "    notifempty\n",
            "    create 0640 {user} {user}\n",
            "}}\n",
        ),
        log_dir = log_dir,
        user = user,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RepoEntry, RepoSpec};
    use crate::platform::OsFamily;
    use crate::settings::Settings;
    use declarative::harness::{
        assert_edge_exists, assert_precedes, assert_resource_absent, assert_resource_exists,
        assert_resource_has_attributes,
    };
    use declarative::{
        ApplyResult, CancelToken, ExecuteOptions, ExecutionPlan, NoProgress, SimulatedHost,
        execute, execute_simple,
    };
    use serde_json::json;

    fn facts(family: OsFamily) -> PlatformFacts {
        PlatformFacts {
            os_family: family,
            kernel: "Linux".to_string(),
            architecture: "amd64".to_string(),
            os_release: "16.04".to_string(),
            operating_system: None,
        }
    }

    fn debian() -> PlatformFacts {
        facts(OsFamily::Debian)
    }

    fn params() -> Parameters {
        Parameters::with_ssh_id("foo")
    }

    fn with_repo() -> Parameters {
        let mut params = params();
        params.repos.insert(
            "git_repo".to_string(),
            RepoEntry::Source("https://example.com/git_repo.git".to_string()),
        );
        params
    }

    fn file(path: &str) -> Identity {
        Identity::new(ResourceKind::File, path)
    }

    fn dir(path: &str) -> Identity {
        Identity::new(ResourceKind::Directory, path)
    }

    fn cron() -> Identity {
        Identity::new(ResourceKind::Cron, GETCONFS_JOB)
    }

    fn getconfs_params() -> Parameters {
        let mut params = params();
        params.enable_getconfs = true;
        params
    }

    #[test]
    fn test_compiles_on_debian_and_redhat() {
        for family in [OsFamily::Debian, OsFamily::RedHat] {
            let graph = compose(&with_repo(), &facts(family)).unwrap();
            assert!(graph.topological_order().is_ok());
            assert_resource_exists(&graph, &anchor(ROLE));
        }
    }

    #[test]
    fn test_other_families_are_unsupported() {
        let mut darwin = facts(OsFamily::Unsupported("Darwin".to_string()));
        darwin.kernel = "Darwin".to_string();
        darwin.os_release = "17.3.0".to_string();
        darwin.architecture = "x86_64".to_string();

        for family in [darwin, facts(OsFamily::Unsupported("Suse".to_string()))] {
            let err = compose(&params(), &family).unwrap_err();
            assert!(matches!(err, ComposeError::UnsupportedPlatform { .. }));
        }
    }

    #[test]
    fn test_platform_checked_before_parameters() {
        let err = compose(
            &Parameters::default(),
            &facts(OsFamily::Unsupported("Darwin".to_string())),
        )
        .unwrap_err();
        assert!(matches!(err, ComposeError::UnsupportedPlatform { .. }));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let err = compose(&Parameters::default(), &debian()).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidParameter { .. }));
    }

    #[test]
    fn test_service_account() {
        let graph = compose(&params(), &debian()).unwrap();
        assert_resource_has_attributes(
            &graph,
            &user_identity(&params()),
            &[
                ("comment", "Configuration Collector Role"),
                ("password", "!!"),
                ("purge_sshkeys", "true"),
                ("system", "true"),
                ("shell", "/bin/bash"),
                ("membership", "inclusive"),
                ("home", "/home/confcollect"),
            ],
        );
    }

    #[test]
    fn test_ssh_key_file() {
        let graph = compose(&params(), &debian()).unwrap();
        let key = file("/home/confcollect/.ssh/id_rsa");
        assert_resource_has_attributes(
            &graph,
            &key,
            &[
                ("ensure", "file"),
                ("mode", "0600"),
                ("owner", "confcollect"),
                ("group", "confcollect"),
                ("content", "foo"),
            ],
        );
        assert_edge_exists(&graph, &dir("/home/confcollect/.ssh"), &key);
        assert_resource_has_attributes(&graph, &dir("/home/confcollect/.ssh"), &[("mode", "0700")]);
    }

    #[test]
    fn test_directories_ordered_parent_first() {
        let graph = compose(&params(), &debian()).unwrap();
        assert_edge_exists(
            &graph,
            &dir("/home/confcollect/lib"),
            &dir("/home/confcollect/lib/python"),
        );
        assert_resource_has_attributes(
            &graph,
            &dir("/var/log/confcollect"),
            &[("owner", "confcollect"), ("ensure", "directory")],
        );
    }

    #[test]
    fn test_repository_checkout() {
        let graph = compose(&with_repo(), &debian()).unwrap();
        let repo = Identity::new(ResourceKind::VcsRepo, "/home/confcollect/src/git_repo");
        assert_resource_has_attributes(
            &graph,
            &repo,
            &[
                ("ensure", "latest"),
                ("provider", "git"),
                ("source", "https://example.com/git_repo.git"),
                ("identity_file", "/home/confcollect/.ssh/id_rsa"),
            ],
        );
        assert_edge_exists(&graph, &user_identity(&params()), &repo);
        assert_precedes(&graph, &file("/home/confcollect/.ssh/id_rsa"), &repo);
        assert_precedes(&graph, &repo, &file("/etc/logrotate.d/confcollect"));
    }

    #[test]
    fn test_repository_overrides() {
        let mut params = params();
        params.repos.insert(
            "pinned".to_string(),
            RepoEntry::Detailed(RepoSpec {
                source: "https://git.example.com/p.git".to_string(),
                ensure: Some(Ensure::Present),
                revision: Some("v1.2".to_string()),
            }),
        );
        let graph = compose(&params, &debian()).unwrap();
        assert_resource_has_attributes(
            &graph,
            &Identity::new(ResourceKind::VcsRepo, "/home/confcollect/src/pinned"),
            &[("ensure", "present"), ("revision", "v1.2")],
        );
    }

    #[test]
    fn test_getconfs_disabled_by_default() {
        let graph = compose(&params(), &debian()).unwrap();
        assert_resource_absent(&graph, &cron());
        assert_resource_absent(&graph, &file("/home/confcollect/bin/getconfs.py"));
        assert_resource_absent(&graph, &anchor(STAGE_GETCONFS));
    }

    #[test]
    fn test_getconfs_enabled() {
        let graph = compose(&getconfs_params(), &debian()).unwrap();
        let script = file("/home/confcollect/bin/getconfs.py");
        let settings = file("/home/confcollect/etc/getconfs.json");

        assert_resource_has_attributes(
            &graph,
            &script,
            &[
                ("mode", "0700"),
                ("owner", "confcollect"),
                ("group", "confcollect"),
                ("content_source", "/usr/share/confcollect/files/getconfs.py"),
            ],
        );
        assert_resource_has_attributes(
            &graph,
            &cron(),
            &[
                ("user", "confcollect"),
                (
                    "command",
                    concat!(
                        "/home/confcollect/bin/getconfs.py --quiet --git",
                        " --ini /home/confcollect/etc/getconfs.json",
                    ),
                ),
                ("minute", "*/30"),
                ("hour", "*"),
            ],
        );
        assert_resource_has_attributes(&graph, &settings, &[("mode", "0600")]);
        assert_edge_exists(&graph, &script, &cron());
        assert_edge_exists(&graph, &settings, &cron());
        assert_edge_exists(
            &graph,
            &file("/home/confcollect/lib/python/collectssh.py"),
            &cron(),
        );
    }

    #[test]
    fn test_getconfs_after_repositories() {
        let mut params = with_repo();
        params.enable_getconfs = true;
        let graph = compose(&params, &debian()).unwrap();
        let repo = Identity::new(ResourceKind::VcsRepo, "/home/confcollect/src/git_repo");
        assert_precedes(&graph, &repo, &cron());
        assert_precedes(&graph, &repo, &file("/home/confcollect/bin/getconfs.py"));
    }

    #[test]
    fn test_stages_strictly_ordered() {
        let mut params = with_repo();
        params.enable_getconfs = true;
        let graph = compose(&params, &debian()).unwrap();
        let stages = [
            STAGE_ACCOUNTS,
            STAGE_INSTALL,
            STAGE_FILES,
            STAGE_GIT,
            STAGE_REPO,
            STAGE_GETCONFS,
            STAGE_LOG,
            ROLE,
        ];
        for pair in stages.windows(2) {
            assert_edge_exists(&graph, &anchor(pair[0]), &anchor(pair[1]));
        }
        assert_precedes(
            &graph,
            &user_identity(&params),
            &file("/home/confcollect/.ssh/id_rsa"),
        );
        assert_precedes(
            &graph,
            &Identity::new(ResourceKind::PipPackage, "netmiko"),
            &cron(),
        );
    }

    #[test]
    fn test_settings_document_rendered() {
        let mut params = getconfs_params();
        params.getconfs_settings = Settings::from_value(json!({
            "sw1": { "type": "ssh", "username": "ops" },
            "DEFAULT": { "username": "collector", "git": "true" },
        }))
        .unwrap();
        let graph = compose(&params, &debian()).unwrap();

        let resource =
            assert_resource_exists(&graph, &file("/home/confcollect/etc/getconfs.json"));
        let content = resource.attribute_map()["content"].clone();
        assert_eq!(content.lines().nth(1), Some("  \"DEFAULT\": {"));
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["sw1"]["username"], "ops");
        assert_eq!(parsed["sw1"]["git"], "true");
    }

    #[test]
    fn test_malformed_settings_rejected() {
        let mut params = getconfs_params();
        params.getconfs_settings = Settings::from_value(json!({ "sw1": [1, 2] })).unwrap();
        let err = compose(&params, &debian()).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidSettings(_)));
    }

    #[test]
    fn test_native_packages_follow_family() {
        let debian_graph = compose(&params(), &debian()).unwrap();
        let redhat_graph = compose(&params(), &facts(OsFamily::RedHat)).unwrap();
        let venv = Identity::new(ResourceKind::Package, "python3-venv");
        let cronie = Identity::new(ResourceKind::Package, "cronie");

        assert_resource_has_attributes(&debian_graph, &venv, &[("provider", "apt")]);
        assert_resource_absent(&debian_graph, &cronie);
        assert_resource_has_attributes(&redhat_graph, &cronie, &[("provider", "yum")]);
        assert_resource_absent(&redhat_graph, &venv);
        assert_edge_exists(
            &debian_graph,
            &Identity::new(ResourceKind::Package, "git"),
            &anchor("git"),
        );
    }

    #[test]
    fn test_pip_packages_in_virtualenv() {
        let graph = compose(&params(), &debian()).unwrap();
        for name in ["gitpython", "netmiko", "requests"] {
            let package = Identity::new(ResourceKind::PipPackage, name);
            assert_resource_has_attributes(
                &graph,
                &package,
                &[("virtualenv", "/home/confcollect/venv"), ("provider", "pip")],
            );
            assert_edge_exists(&graph, &anchor("python"), &package);
        }
    }

    #[test]
    fn test_custom_user_and_home() {
        let mut params = with_repo();
        params.user = "collector".to_string();
        params.home = Some("/srv/collector/".to_string());
        params.enable_getconfs = true;
        let graph = compose(&params, &debian()).unwrap();

        assert_resource_has_attributes(
            &graph,
            &file("/srv/collector/.ssh/id_rsa"),
            &[("owner", "collector")],
        );
        assert_resource_exists(
            &graph,
            &Identity::new(ResourceKind::VcsRepo, "/srv/collector/src/git_repo"),
        );
        assert_resource_has_attributes(&graph, &cron(), &[("user", "collector")]);
        assert_resource_exists(&graph, &dir("/var/log/collector"));
        assert!(!graph.contains(&dir("/var/log/confcollect")));
        let logrotate = assert_resource_exists(&graph, &file("/etc/logrotate.d/collector"));
        let content = logrotate.attribute_map()["content"].clone();
        assert!(content.starts_with("/var/log/collector/*.log {"));
        assert!(content.contains("create 0640 collector collector"));
    }

    #[test]
    fn test_composition_is_deterministic() {
        let mut params = with_repo();
        params.enable_getconfs = true;
        let first = compose(&params, &debian()).unwrap();
        let second = compose(&params, &debian()).unwrap();

        assert_eq!(first.resources(), second.resources());
        assert_eq!(
            first.edges().collect::<Vec<_>>(),
            second.edges().collect::<Vec<_>>()
        );
        assert_eq!(
            first.topological_order().unwrap(),
            second.topological_order().unwrap()
        );
    }

    #[test]
    fn test_empty_args_leave_no_double_space() {
        let mut params = getconfs_params();
        params.getconfs_args = "  ".to_string();
        let graph = compose(&params, &debian()).unwrap();
        assert_resource_has_attributes(
            &graph,
            &cron(),
            &[(
                "command",
                "/home/confcollect/bin/getconfs.py --ini /home/confcollect/etc/getconfs.json",
            )],
        );
    }

    #[test]
    fn test_apply_converges_and_is_idempotent() {
        let mut params = with_repo();
        params.enable_getconfs = true;
        let plan = ExecutionPlan::new(compose(&params, &debian()).unwrap()).unwrap();
        let host = SimulatedHost::new();

        let first = execute_simple(&plan, &host, &ExecuteOptions::default()).unwrap();
        assert!(first.is_success());
        assert!(first.summary.total_changes() > 0);

        let applied = host.apply_count();
        let second = execute_simple(&plan, &host, &ExecuteOptions::default()).unwrap();
        assert!(second.is_success());
        assert_eq!(second.summary.total_changes(), 0);
        assert_eq!(host.apply_count(), applied);
        assert!(second.results.iter().all(|r| r.result == ApplyResult::NoChange));
    }

    #[test]
    fn test_apply_order_respects_stages() {
        let mut params = with_repo();
        params.enable_getconfs = true;
        let plan = ExecutionPlan::new(compose(&params, &debian()).unwrap()).unwrap();
        let host = SimulatedHost::new();
        let opts = ExecuteOptions {
            jobs: 8,
            ..ExecuteOptions::default()
        };
        execute_simple(&plan, &host, &opts).unwrap();

        let order = host.applied();
        let position = |id: &Identity| order.iter().position(|a| a == id).unwrap();
        let user = user_identity(&params);
        let key = file("/home/confcollect/.ssh/id_rsa");
        let repo = Identity::new(ResourceKind::VcsRepo, "/home/confcollect/src/git_repo");
        assert!(position(&user) < position(&key));
        assert!(position(&key) < position(&repo));
        assert!(position(&repo) < position(&cron()));
    }

    #[test]
    fn test_failed_checkout_blocks_later_stages() {
        let mut params = with_repo();
        params.enable_getconfs = true;
        let plan = ExecutionPlan::new(compose(&params, &debian()).unwrap()).unwrap();
        let host = SimulatedHost::new();
        let repo = Identity::new(ResourceKind::VcsRepo, "/home/confcollect/src/git_repo");
        host.fail_apply(repo.clone());

        let report = execute(
            &plan,
            &host,
            &ExecuteOptions::default(),
            &CancelToken::new(),
            &mut NoProgress,
        )
        .unwrap();

        assert!(!report.is_success());
        assert!(matches!(
            report.get(&repo).unwrap().result,
            ApplyResult::Failed { .. }
        ));
        assert!(matches!(
            report.get(&cron()).unwrap().result,
            ApplyResult::Blocked { .. }
        ));
        // the key is ordered ahead of the checkout
        assert!(report.get(&file("/home/confcollect/.ssh/id_rsa")).unwrap().is_done());
    }
}
