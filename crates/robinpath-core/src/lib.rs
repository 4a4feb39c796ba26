//! `robinpath-core`: lexer, parser, AST, and tree-walking executor for the
//! RobinPath scripting language.
//!
//! ```no_run
//! # use robinpath_core::{parse, host::Host, exec::{Executor, Program}};
//! # async fn run() {
//! let ast = parse("log \"hi\"\n").unwrap();
//! let program = Program::from_ast(ast);
//! let host = Host::new();
//! let mut executor = Executor::new(&host, program.functions.clone());
//! executor.run(&program).await.unwrap();
//! # }
//! ```

pub mod ast;
pub mod env;
pub mod error;
pub mod exec;
pub mod expr_eval;
pub mod host;
pub mod json_lite;
pub mod lexer;
pub mod parser;
pub mod pos;
pub mod stream;
pub mod token;
pub mod value;

pub use ast::Ast;
pub use error::RobinError;
pub use parser::parse;
