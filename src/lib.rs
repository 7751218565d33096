//! A hierarchical, menu-driven interactive command shell.
//!
//! A shell is a tree of named menu nodes. Each node has its own commands and
//! links to child nodes; the user navigates the tree by typing child names,
//! `back` and `home`, and runs commands at the active node or, one-shot, in a
//! descendant (`services network show`).
//!
//! Nodes are described declaratively with [`NodeType`] and registered on an
//! [`Environment`], which builds each node lazily the first time it is needed
//! and keeps it for the rest of the process. Plugins add node types at runtime
//! and attach them under existing nodes by type name or node name. The
//! [`Interpreter`] drives the tree from a line editor with history and tab
//! completion, or from a script.

mod builtin;
pub mod command;
pub mod completion;
pub mod config;
pub mod dispatcher;
pub mod env;
pub mod error;
pub mod interrupt;
pub mod io_adapters;
mod interpreter;
pub mod menus;
pub mod node;
pub mod pager;
pub mod parser;
pub mod plugin;

pub use command::{Category, Command, CommandTable, Context, Flow};
pub use config::ConfigStore;
pub use dispatcher::{Dispatcher, Step};
pub use env::Environment;
pub use error::ShellError;
pub use interpreter::{HISTORY_LEN, Interpreter};
pub use io_adapters::{MemReader, MemWriter, ScriptedTerminal};
pub use node::{MenuNode, NodeType};
pub use pager::{Pager, Terminal};
pub use plugin::PluginSpec;
