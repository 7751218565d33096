use crate::builtin;
use crate::config::{ConfigStore, Section};
use crate::error::{Result, ShellError};
use crate::interrupt::CancelToken;
use crate::io_adapters::ConsoleTerminal;
use crate::node::{ChildLink, MenuNode, NodeType};
use crate::pager::{Pager, Terminal};
use crate::plugin::{self, Attachment, PluginSpec};
use console::style;
use crossterm::QueueableCommand;
use crossterm::cursor::MoveTo;
use crossterm::terminal::{Clear, ClearType};
use serde_json::json;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Config section holding the shell's own settings.
pub const SHELL_SECTION: &str = "shell";

/// Default values of the [`SHELL_SECTION`] settings.
pub fn shell_defaults() -> Section {
    [
        ("debug", json!(false)),
        ("page_break", json!(true)),
        ("path_delimiter", json!(">")),
        ("prompt_terminator", json!("#")),
        ("history_file", json!("")),
        ("plugin_dir", json!("")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// A registered plugin with its descriptors already parsed.
struct LoadedPlugin {
    spec: PluginSpec,
    targets: Vec<Attachment>,
}

/// Shared context of every menu node.
///
/// The environment is the node registry (node types, plugin specs and the
/// singleton cache of live nodes), the running configuration and the IO
/// handles. It is created once at startup and passed by reference to
/// everything that needs it.
pub struct Environment {
    catalog: HashMap<String, NodeType>,
    /// Node name to type name, to keep names unique.
    node_names: HashMap<String, String>,
    cache: HashMap<String, Rc<MenuNode>>,
    plugins: Vec<LoadedPlugin>,
    /// Construction reports held back while output is muted.
    deferred: Vec<String>,
    muted: bool,
    config: ConfigStore,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
    terminal: Box<dyn Terminal>,
    cancel: CancelToken,
}

impl Environment {
    /// Create an environment writing to the process stdio.
    ///
    /// Settings missing from the `shell` section of `config` get their
    /// defaults; a section that failed to load is therefore not fatal here.
    pub fn new(mut config: ConfigStore) -> Self {
        for (key, value) in shell_defaults() {
            if config.get(SHELL_SECTION, &key).is_none() {
                config.set(SHELL_SECTION, &key, value);
            }
        }
        Self {
            catalog: HashMap::new(),
            node_names: HashMap::new(),
            cache: HashMap::new(),
            plugins: Vec::new(),
            deferred: Vec::new(),
            muted: false,
            config,
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
            terminal: Box::new(ConsoleTerminal::new()),
            cancel: CancelToken::new(),
        }
    }

    /// Send output and error text to the given writers instead of stdio.
    pub fn with_output(mut self, stdout: Box<dyn Write>, stderr: Box<dyn Write>) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    /// Use `terminal` for pager keystrokes and the screen height.
    pub fn with_terminal(mut self, terminal: Box<dyn Terminal>) -> Self {
        self.terminal = terminal;
        self
    }

    /// Token raised by Ctrl-C and checked by long-running output.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Whether full error chains are shown.
    pub fn debug(&self) -> bool {
        self.config.get_bool(SHELL_SECTION, "debug").unwrap_or(false)
    }

    pub fn set_debug(&mut self, on: bool) {
        self.config.set(SHELL_SECTION, "debug", on);
    }

    /// Whether long output is paginated.
    pub fn page_break(&self) -> bool {
        self.config
            .get_bool(SHELL_SECTION, "page_break")
            .unwrap_or(true)
    }

    pub fn set_page_break(&mut self, on: bool) {
        self.config.set(SHELL_SECTION, "page_break", on);
    }

    /// Separator between node names in the prompt.
    pub fn path_delimiter(&self) -> &str {
        self.config
            .get_str(SHELL_SECTION, "path_delimiter")
            .unwrap_or(">")
    }

    /// Suffix that ends the prompt.
    pub fn prompt_terminator(&self) -> &str {
        self.config
            .get_str(SHELL_SECTION, "prompt_terminator")
            .unwrap_or("#")
    }

    /// Where command history is kept, if anywhere.
    pub fn history_file(&self) -> Option<PathBuf> {
        self.config
            .get_str(SHELL_SECTION, "history_file")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// Directory scanned for plugin manifests.
    pub fn plugin_dir(&self) -> Option<PathBuf> {
        self.config
            .get_str(SHELL_SECTION, "plugin_dir")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// The running configuration.
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    /// Persist the running configuration.
    pub fn save_config(&mut self) -> Result<()> {
        self.config.save()
    }

    /// Unsaved changes, empty when there are none.
    pub fn config_diff(&self) -> Result<String> {
        self.config.diff()
    }

    /// Make a node type available to [`Environment::get_or_create`].
    ///
    /// Type names and node names must both be unique.
    pub fn register_type(&mut self, node_type: NodeType) -> Result<()> {
        if self.catalog.contains_key(node_type.type_name()) {
            return Err(ShellError::DuplicateNode(node_type.type_name().to_string()));
        }
        if self.node_names.contains_key(node_type.name()) {
            return Err(ShellError::DuplicateNode(node_type.name().to_string()));
        }
        self.node_names
            .insert(node_type.name().to_string(), node_type.type_name().to_string());
        self.catalog
            .insert(node_type.type_name().to_string(), node_type);
        Ok(())
    }

    /// Whether `type_name` has been registered.
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.catalog.contains_key(type_name)
    }

    /// The live node of `type_name`, if it has been constructed.
    pub fn cached(&self, type_name: &str) -> Option<Rc<MenuNode>> {
        self.cache.get(type_name).cloned()
    }

    /// Return the single live node of `type_name`, constructing it on first use.
    ///
    /// Construction registers the base commands and the type's static
    /// commands, runs the setup hook, then links static children followed by
    /// plugin children. A failing setup hook leaves nothing in the cache.
    pub fn get_or_create(&mut self, type_name: &str) -> Result<Rc<MenuNode>> {
        if let Some(node) = self.cache.get(type_name) {
            return Ok(node.clone());
        }
        let node_type = self
            .catalog
            .get(type_name)
            .cloned()
            .ok_or_else(|| ShellError::UnknownNode(type_name.to_string()))?;

        let mut commands = builtin::base_commands();
        for command in node_type.commands() {
            commands.insert(command.clone());
        }
        if let Some(hook) = node_type.setup_hook().cloned() {
            hook(&mut commands, self).map_err(|source| ShellError::Setup {
                node: node_type.name().to_string(),
                source,
            })?;
        }

        let mut node = MenuNode::new(&node_type, commands, Vec::new());
        let mut children: Vec<ChildLink> = Vec::new();
        let plugin_children: Vec<String> = self
            .attachments_for(&node)
            .into_iter()
            .map(|spec| spec.node_type.type_name().to_string())
            .collect();
        for child in node_type.children().iter().chain(plugin_children.iter()) {
            if children.iter().any(|c| &c.type_name == child) {
                continue;
            }
            match self.catalog.get(child) {
                Some(child_type) => children.push(ChildLink {
                    name: child_type.name().to_string(),
                    type_name: child.clone(),
                    summary: child_type.summary_or_default(),
                }),
                None => {
                    let err = ShellError::UnknownNode(child.clone());
                    tracing::warn!(menu = node_type.name(), error = %err, "skipping child");
                    self.construction_report(format!(
                        "Error loading submenu '{child}' of '{}': {err}",
                        node_type.name()
                    ));
                }
            }
        }
        node.set_children(children);

        let node = Rc::new(node);
        tracing::debug!(menu = node.name(), type_name, "created menu node");
        self.cache.insert(type_name.to_string(), node.clone());
        Ok(node)
    }

    /// Like [`Environment::get_or_create`], but reports raised while building
    /// the node are held back until [`Environment::flush_deferred`].
    /// Used while the line editor owns the terminal.
    pub fn get_or_create_muted(&mut self, type_name: &str) -> Result<Rc<MenuNode>> {
        let was_muted = std::mem::replace(&mut self.muted, true);
        let node = self.get_or_create(type_name);
        self.muted = was_muted;
        node
    }

    /// Print reports held back by [`Environment::get_or_create_muted`].
    pub fn flush_deferred(&mut self) {
        for msg in std::mem::take(&mut self.deferred) {
            let _ = self.eprint(&msg);
        }
    }

    fn construction_report(&mut self, msg: String) {
        if self.muted {
            self.deferred.push(msg);
        } else {
            let _ = self.eprint(&msg);
        }
    }

    /// Register a plugin's node type and keep its spec for attachment.
    ///
    /// Nothing is attached here: nodes pick up their plugin children when
    /// they are constructed. A malformed descriptor or a duplicate type or
    /// node name rejects the whole plugin.
    pub fn register_plugin(&mut self, spec: PluginSpec) -> Result<()> {
        let targets = spec.validate()?;
        let node_type = spec.node_type.clone();
        self.register_type(node_type).map_err(|e| ShellError::PluginLoad {
            plugin: spec.node_type.type_name().to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(
            plugin = spec.node_type.type_name(),
            attachments = ?targets,
            "registered plugin"
        );
        self.plugins.push(LoadedPlugin { spec, targets });
        Ok(())
    }

    /// Specs of every registered plugin, in registration order.
    pub fn plugin_specs(&self) -> impl Iterator<Item = &PluginSpec> {
        self.plugins.iter().map(|p| &p.spec)
    }

    /// Plugins that attach under `node`.
    pub fn attachments_for(&self, node: &MenuNode) -> Vec<PluginSpec> {
        self.plugins
            .iter()
            .filter(|p| p.targets.iter().any(|t| t.matches(node)))
            .map(|p| p.spec.clone())
            .collect()
    }

    /// Report descriptors that name no registered type or node. Returns how
    /// many were found.
    pub fn report_unresolved_attachments(&mut self) -> usize {
        let mut unresolved = Vec::new();
        for plugin in &self.plugins {
            for (descriptor, target) in plugin.spec.attachments.iter().zip(&plugin.targets) {
                let resolved = match target {
                    Attachment::Class(type_name) => self.catalog.contains_key(type_name),
                    Attachment::Name(name) => self.node_names.contains_key(name),
                };
                if !resolved {
                    unresolved.push(ShellError::PluginLoad {
                        plugin: plugin.spec.node_type.type_name().to_string(),
                        reason: format!("no parent matches '{descriptor}'"),
                    });
                }
            }
        }
        for err in &unresolved {
            tracing::warn!(error = %err, "unresolved attachment");
            let _ = self.eprint(&err.to_string());
        }
        unresolved.len()
    }

    /// Register every plugin manifest found in `dir`. Bad plugins are
    /// reported and skipped; returns how many were loaded.
    pub fn load_plugins(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for found in plugin::discover(dir)? {
            match found.and_then(|spec| self.register_plugin(spec)) {
                Ok(()) => loaded += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping plugin");
                    let _ = self.eprint(&e.to_string());
                }
            }
        }
        tracing::info!(dir = %dir.display(), count = loaded, "loaded plugins");
        Ok(loaded)
    }


    /// Write to the shell output, paginating if `page_break` is on.
    pub fn print(&mut self, text: &str) -> io::Result<()> {
        let paging = self.page_break();
        let paged = Pager::new(&mut *self.stdout, &mut *self.terminal)
            .with_cancel(&self.cancel)
            .write(text, paging)?;
        tracing::trace!(?paged, "wrote output");
        Ok(())
    }

    /// Write to the shell output without pagination.
    pub fn print_plain(&mut self, text: &str) -> io::Result<()> {
        Pager::new(&mut *self.stdout, &mut *self.terminal).write(text, false)?;
        Ok(())
    }

    /// Write an error line in red. Never paginated.
    pub fn eprint(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.stderr, "{}", style(text.trim_end_matches('\n')).red())?;
        self.stderr.flush()
    }

    /// Report a failed command line. With debug on the whole error chain is
    /// shown, otherwise a single line.
    pub fn report(&mut self, line: &str, err: &anyhow::Error) {
        tracing::debug!(line, error = ?err, "command failed");
        let msg = if self.debug() {
            format!("\"{line}\": {err:?}")
        } else {
            format!("\"{line}\": {err:#}")
        };
        let _ = self.eprint(&msg);
    }

    pub fn clear_screen(&mut self) -> io::Result<()> {
        self.stdout
            .queue(Clear(ClearType::All))?
            .queue(MoveTo(0, 0))?;
        self.stdout.flush()
    }

    /// Give the terminal back in its original mode.
    pub fn release_terminal(&mut self) {
        if let Err(e) = self.terminal.disable_raw_mode() {
            tracing::warn!(error = %e, "failed to restore terminal mode");
        }
        let _ = self.stdout.flush();
        let _ = self.stderr.flush();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::command::Command;
    use crate::io_adapters::{MemWriter, ScriptedTerminal};
    use std::cell::RefCell;

    pub(crate) struct Captured {
        pub out: Rc<RefCell<Vec<u8>>>,
        pub err: Rc<RefCell<Vec<u8>>>,
    }

    impl Captured {
        pub fn out(&self) -> String {
            console::strip_ansi_codes(&String::from_utf8_lossy(&self.out.borrow())).into_owned()
        }

        pub fn err(&self) -> String {
            console::strip_ansi_codes(&String::from_utf8_lossy(&self.err.borrow())).into_owned()
        }

        pub fn clear(&self) {
            self.out.borrow_mut().clear();
            self.err.borrow_mut().clear();
        }
    }

    /// In-memory environment without pagination.
    pub(crate) fn test_env() -> (Environment, Captured) {
        test_env_with(ConfigStore::in_memory())
    }

    pub(crate) fn test_env_with(config: ConfigStore) -> (Environment, Captured) {
        let (out, out_handle) = MemWriter::with_handle();
        let (err, err_handle) = MemWriter::with_handle();
        let env = Environment::new(config)
            .with_output(Box::new(out), Box::new(err))
            .with_terminal(Box::new(ScriptedTerminal::new(None, [])));
        (
            env,
            Captured {
                out: out_handle,
                err: err_handle,
            },
        )
    }

    #[test]
    fn test_get_or_create_is_singleton() {
        let (mut env, _io) = test_env();
        env.register_type(NodeType::new("HomeMenu", "home_menu")).unwrap();

        let first = env.get_or_create("HomeMenu").unwrap();
        let second = env.get_or_create("HomeMenu").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(Rc::ptr_eq(&first, &env.cached("HomeMenu").unwrap()));
    }

    #[test]
    fn test_duplicate_types_and_names_rejected() {
        let (mut env, _io) = test_env();
        env.register_type(NodeType::new("HomeMenu", "home_menu")).unwrap();
        assert!(matches!(
            env.register_type(NodeType::new("HomeMenu", "other")),
            Err(ShellError::DuplicateNode(_))
        ));
        assert!(matches!(
            env.register_type(NodeType::new("Other", "home_menu")),
            Err(ShellError::DuplicateNode(_))
        ));
    }

    #[test]
    fn test_unknown_type_fails() {
        let (mut env, _io) = test_env();
        assert!(matches!(
            env.get_or_create("Nope"),
            Err(ShellError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_construction_links_children_and_base_commands() {
        let (mut env, io) = test_env();
        env.register_type(
            NodeType::new("HomeMenu", "home_menu")
                .child("ServicesMenu")
                .child("MissingMenu")
                .command(Command::new("show", "show it", |_, _| Ok(()))),
        )
        .unwrap();
        env.register_type(NodeType::new("ServicesMenu", "services_menu").summary("Services"))
            .unwrap();

        let home = env.get_or_create("HomeMenu").unwrap();
        assert_eq!(home.children().len(), 1);
        assert_eq!(home.children()[0].name, "services_menu");
        assert_eq!(home.children()[0].summary, "Services");
        assert!(home.command("show").is_some());
        assert!(home.command("back").is_some());
        assert!(home.command("quit").is_some());
        assert!(io.err().contains("MissingMenu"));
        // children are created lazily
        assert!(env.cached("ServicesMenu").is_none());
    }

    #[test]
    fn test_setup_hook_runs_and_failure_is_not_cached() {
        let (mut env, _io) = test_env();
        env.register_type(NodeType::new("Good", "good").setup(|table, env| {
            env.set_debug(true);
            table.insert(Command::new("dynamic", "added at setup", |_, _| Ok(())));
            Ok(())
        }))
        .unwrap();
        env.register_type(
            NodeType::new("Bad", "bad").setup(|_, _| Err(anyhow::anyhow!("no backend"))),
        )
        .unwrap();

        let good = env.get_or_create("Good").unwrap();
        assert!(good.command("dynamic").is_some());
        assert!(env.debug());

        assert!(matches!(env.get_or_create("Bad"), Err(ShellError::Setup { .. })));
        assert!(env.cached("Bad").is_none());
    }

    #[test]
    fn test_plugins_attach_by_class_and_name() {
        let (mut env, io) = test_env();
        env.register_type(NodeType::new("HomeMenu", "home_menu").child("TestsMenu"))
            .unwrap();
        env.register_type(NodeType::new("TestsMenu", "tests_menu")).unwrap();

        env.register_plugin(PluginSpec::new(
            NodeType::new("ImagesMenu", "images_menu"),
            ["class:HomeMenu"],
        ))
        .unwrap();
        env.register_plugin(PluginSpec::new(
            NodeType::new("StorageMenu", "storage_menu"),
            ["name:tests_menu"],
        ))
        .unwrap();
        let bad = env.register_plugin(PluginSpec::new(
            NodeType::new("BrokenMenu", "broken_menu"),
            ["class:HomeMenu", "parent=HomeMenu"],
        ));
        assert!(matches!(bad, Err(ShellError::PluginLoad { .. })));
        assert!(!env.is_registered("BrokenMenu"));
        assert_eq!(env.plugin_specs().count(), 2);

        let home = env.get_or_create("HomeMenu").unwrap();
        let names: Vec<&str> = home.children().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["tests_menu", "images_menu"]);
        let attached: Vec<String> = env
            .attachments_for(&home)
            .iter()
            .map(|spec| spec.node_type.type_name().to_string())
            .collect();
        assert_eq!(attached, vec!["ImagesMenu"]);

        let tests = env.get_or_create("TestsMenu").unwrap();
        let names: Vec<&str> = tests.children().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["storage_menu"]);
        assert_eq!(env.report_unresolved_attachments(), 0);
        assert_eq!(io.err(), "");
    }

    #[test]
    fn test_duplicate_plugin_is_skipped() {
        let (mut env, _io) = test_env();
        env.register_type(NodeType::new("HomeMenu", "home_menu")).unwrap();
        let dup = env.register_plugin(PluginSpec::new(
            NodeType::new("Images", "home_menu"),
            ["class:HomeMenu"],
        ));
        assert!(matches!(dup, Err(ShellError::PluginLoad { .. })));
        assert_eq!(env.plugin_specs().count(), 0);
    }

    #[test]
    fn test_unresolved_attachments_are_reported() {
        let (mut env, io) = test_env();
        env.register_plugin(PluginSpec::new(
            NodeType::new("Images", "images"),
            ["class:NoSuchMenu"],
        ))
        .unwrap();
        assert_eq!(env.report_unresolved_attachments(), 1);
        assert!(io.err().contains("class:NoSuchMenu"));
    }

    #[test]
    fn test_load_plugins_from_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("menu_images.json"),
            r#"{"type_name": "ImagesMenu", "name": "images_menu",
                "parents": ["class:HomeMenu"]}"#,
        )?;
        std::fs::write(
            dir.path().join("menu_zbad.json"),
            r#"{"type_name": "BadMenu", "name": "bad_menu", "parents": ["HomeMenu"]}"#,
        )?;

        let (mut env, io) = test_env();
        env.register_type(NodeType::new("HomeMenu", "home_menu"))?;
        assert_eq!(env.load_plugins(dir.path())?, 1);
        assert!(io.err().contains("BadMenu"));

        let home = env.get_or_create("HomeMenu")?;
        assert!(home.child("images_menu").is_some());
        Ok(())
    }

    #[test]
    fn test_settings_have_defaults() {
        let (env, _io) = test_env();
        assert!(!env.debug());
        assert!(env.page_break());
        assert_eq!(env.path_delimiter(), ">");
        assert_eq!(env.prompt_terminator(), "#");
        assert_eq!(env.history_file(), None);
    }
}
