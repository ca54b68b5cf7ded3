//! A Liquid-flavoured template engine.
//!
//! Templates are parsed once into an immutable node tree and rendered any
//! number of times, from any thread, against per-render variables. The tag
//! set, filters, naming convention and partial loader are all configurable
//! through [`Config`].
//!
//! ```
//! use loquat::{RenderParameters, Scope, Template};
//!
//! let template = Template::parse(
//!     "{% for item in items %}{{ forloop.index }}. {{ item }}\n{% endfor %}",
//! )
//! .unwrap();
//! let locals = Scope::new().with("items", vec!["apples", "pears"]);
//! let output = template
//!     .render_with(RenderParameters::new().locals(locals))
//!     .unwrap();
//! assert_eq!(output, "1. apples\n2. pears\n");
//! ```

mod ast;
mod condition;
mod config;
mod context;
mod drop;
mod engine;
mod error;
mod expression;
mod file_system;
mod naming;
mod parser;
pub mod tags;
mod template;
mod tokenizer;
mod value;

// Public exports.
pub use ast::{Document, Node, NodeList, Tag, render_all, walk};
pub use condition::Condition;
pub use config::{Config, FilterFn, Filters, MAX_INCLUDE_DEPTH, NumberParser, invariant_number};
pub use context::{Context, Registers, Scope};
pub use drop::{Accessor, AsAny, LiquidDrop, MemberTable, SafeTypeEntry, SafeTypeRegistry};
pub use engine::Engine;
pub use error::{ErrorKind, Location, LoquatError, LoquatResult, ParseError, ParseErrorKind};
pub use expression::{Expression, FilterCall, Output, Segment, VariablePath};
pub use file_system::{BlankFileSystem, FileSystem, LocalFileSystem, MemoryFileSystem};
pub use naming::{CSharpNamingConvention, NamingConvention, RubyNamingConvention};
pub use parser::{BodyEnd, Parser, TagFactory, TagHeader, TagRegistry, parse_document};
pub use template::{RenderParameters, Template};
pub use tokenizer::{Token, TokenKind, expand_shorthands, tokenize};
pub use value::{Hash, HostObject, Value};
