use crate::completion::ShellHelper;
use crate::dispatcher::{Dispatcher, Step};
use crate::env::Environment;
use crate::interrupt::{Interrupt, InterruptGate};
use rustyline::error::ReadlineError;
use rustyline::history::{DefaultHistory, History};
use rustyline::{CompletionType, Config, Editor};
use std::cell::{Ref, RefCell};
use std::fs;
use std::io::BufRead;
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

/// Number of history entries kept on disk.
pub const HISTORY_LEN: usize = 100;

/// Line-editing front end driving a [`Dispatcher`].
///
/// ```
/// use menu_shell::{Command, ConfigStore, Environment, Interpreter, NodeType, Step};
/// let mut env = Environment::new(ConfigStore::in_memory())
///     .with_output(Box::new(std::io::sink()), Box::new(std::io::sink()));
/// env.register_type(NodeType::new("HomeMenu", "home")).unwrap();
/// let mut sh = Interpreter::new(env, "HomeMenu").unwrap();
/// assert_eq!(sh.prompt(), "home#");
/// assert_eq!(sh.dispatch("quit"), Step::Quit);
/// ```
pub struct Interpreter {
    env: Rc<RefCell<Environment>>,
    dispatcher: Dispatcher,
    gate: InterruptGate,
}

impl Interpreter {
    /// Start at the node of type `root_type`, constructing it if needed.
    pub fn new(mut env: Environment, root_type: &str) -> crate::error::Result<Self> {
        let root = env.get_or_create(root_type)?;
        Ok(Self {
            env: Rc::new(RefCell::new(env)),
            dispatcher: Dispatcher::new(root),
            gate: InterruptGate::default(),
        })
    }

    /// Shared view of the environment.
    pub fn env(&self) -> Ref<'_, Environment> {
        self.env.borrow()
    }

    /// Prompt for the active path, without the trailing space.
    pub fn prompt(&self) -> String {
        self.dispatcher.prompt(&self.env.borrow())
    }

    /// Names of the nodes on the active path.
    pub fn path_names(&self) -> Vec<String> {
        self.dispatcher
            .path_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Dispatch a single line at the active node.
    pub fn dispatch(&mut self, line: &str) -> Step {
        self.dispatcher.dispatch(&mut self.env.borrow_mut(), line)
    }

    /// Dispatch every line of `input` until it ends or a line quits.
    pub fn run_script<R: BufRead>(&mut self, input: R) -> anyhow::Result<()> {
        for line in input.lines() {
            let line = line?;
            tracing::trace!(%line, "script line");
            if self.dispatch(&line) == Step::Quit {
                break;
            }
            if self.env.borrow().cancel_token().take() {
                tracing::info!("script interrupted");
                break;
            }
        }
        self.env.borrow_mut().release_terminal();
        Ok(())
    }

    /// Interactive read loop with history and tab completion.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut rl: Editor<ShellHelper, DefaultHistory> = Editor::with_config(editor_config()?)?;
        rl.set_helper(Some(ShellHelper::new(
            self.env.clone(),
            self.dispatcher.current().clone(),
        )));

        let history = self.env.borrow().history_file();
        if let Some(path) = history.as_deref() {
            if let Err(e) = load_history(rl.history_mut(), path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to load history");
            }
        }

        let intro = self.dispatcher.current().intro().to_string();
        self.env.borrow_mut().print(&intro)?;

        let cancel = self.env.borrow().cancel_token().clone();
        let result = loop {
            if cancel.take() && self.gate.record(Instant::now()) == Interrupt::ForceQuit {
                tracing::info!("forced quit");
                break Ok(());
            }
            if let Some(helper) = rl.helper_mut() {
                helper.set_node(self.dispatcher.current().clone());
            }
            let prompt = format!("{} ", self.prompt());
            match rl.readline(&prompt) {
                Ok(line) => {
                    if self.dispatch(&line) == Step::Quit {
                        break Ok(());
                    }
                }
                Err(ReadlineError::Interrupted) => match self.gate.record(Instant::now()) {
                    Interrupt::CancelLine => continue,
                    Interrupt::ForceQuit => {
                        tracing::info!("forced quit");
                        break Ok(());
                    }
                },
                Err(ReadlineError::Eof) => {
                    // Ctrl-D quits without the unsaved configuration check
                    self.env.borrow_mut().print("Quitting.")?;
                    break Ok(());
                }
                Err(err) => break Err(err),
            }
        };

        if let Some(path) = history.as_deref() {
            if let Err(e) = save_history(rl.history_mut(), path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to save history");
            }
        }
        self.env.borrow_mut().release_terminal();
        Ok(result?)
    }
}

fn editor_config() -> rustyline::Result<Config> {
    Ok(Config::builder()
        .max_history_size(HISTORY_LEN)?
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .build())
}

/// Load `path` into `history`. A missing file is an empty history. Entries
/// beyond the history size drop the oldest ones.
fn load_history(history: &mut DefaultHistory, path: &Path) -> rustyline::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    history.load(path)
}

/// Write `history` to `path`, creating its directory. At most
/// [`HISTORY_LEN`] entries are kept.
fn save_history(history: &mut DefaultHistory, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    history.save(path)?;
    Ok(())
}
