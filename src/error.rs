pub type LoquatResult<T> = std::result::Result<T, LoquatError>;

/// Broad classification of everything that can go wrong while parsing or
/// rendering a template.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Runtime,
    ResourceExhausted,
    FileSystem,
    Argument,
}

/// 1-based position of the token that produced a parse error.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("Tag '{token}' was not properly terminated with '%}}'")]
    UnterminatedTag { token: String },
    #[error("Variable '{token}' was not properly terminated with '}}}}'")]
    UnterminatedOutput { token: String },
    #[error("Tag '{token}' is malformed")]
    MalformedTag { token: String },
    #[error("'{block}' tag was never closed")]
    BlockNotClosed { block: String },
    #[error("'{tag}' with no matching conditional tag")]
    UnexpectedBranch { tag: String },
    #[error("'{block}' tag does not expect '{tag}' tag")]
    UnexpectedBranchIn { tag: String, block: String },
    #[error("'{tag}' with no matching opening tag")]
    UnmatchedEnd { tag: String },
    #[error("'{tag}' is not a valid delimiter for {block} tags. use {expected}")]
    InvalidDelimiter {
        tag: String,
        block: String,
        expected: String,
    },
    #[error("Unknown tag '{tag}'")]
    UnknownTag { tag: String },
    #[error("Syntax error in '{tag}' - valid syntax: {usage}")]
    InvalidSyntax { tag: String, usage: String },
    #[error("Block '{name}' was defined more than once")]
    DuplicateBlock { name: String },
    #[error("'extends' must be the first tag in a template")]
    ExtendsNotFirst,
    #[error("'extends' can be used only once per template")]
    ExtendsRepeated,
    #[error("{0}")]
    Message(String),
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParseError {
    pub location: Option<Location>,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub const fn new(kind: ParseErrorKind, location: Location) -> Self {
        Self {
            location: Some(location),
            kind,
        }
    }

    /// A syntax error raised away from any source position, e.g. by host code
    /// during rendering.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            location: None,
            kind: ParseErrorKind::Message(message.into()),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.location {
            Some(Location { line, column }) => {
                write!(f, "{} (line {line}, column {column})", self.kind)
            }
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LoquatError {
    /// Malformed markup, either found while parsing or raised by host code.
    #[error(transparent)]
    Syntax(#[from] ParseError),
    #[error("{message}")]
    Runtime { message: String },
    /// A recursion guard tripped, e.g. runaway `include` chains.
    #[error("{message}")]
    ResourceExhausted { message: String },
    #[error("{message}")]
    FileSystem { message: String },
    #[error("{message}")]
    Argument { message: String },
    #[error("Template already exists: {template_name}")]
    TemplateExists { template_name: String },
    #[error("Template not found: {template_name}")]
    MissingTemplate { template_name: String },
    /// A failure raised from inside a drop member. Unwrapped before it is
    /// reported.
    #[error("{source}")]
    MemberCall {
        member: String,
        source: Box<LoquatError>,
    },
}

impl LoquatError {
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax(ParseError::message(message))
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: message.into(),
        }
    }

    pub fn file_system(message: impl Into<String>) -> Self {
        Self::FileSystem {
            message: message.into(),
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax(_) => ErrorKind::Syntax,
            Self::Runtime { .. } => ErrorKind::Runtime,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::FileSystem { .. } | Self::MissingTemplate { .. } => ErrorKind::FileSystem,
            Self::Argument { .. } | Self::TemplateExists { .. } => ErrorKind::Argument,
            Self::MemberCall { source, .. } => source.kind(),
        }
    }

    /// Strips a single level of [`LoquatError::MemberCall`] wrapping.
    pub fn unwrap_member_call(self) -> Self {
        match self {
            Self::MemberCall { source, .. } => *source,
            other => other,
        }
    }

    /// The text written into the output in place of a failed node.
    pub fn inline_message(&self) -> String {
        match self.kind() {
            ErrorKind::Syntax => format!("Liquid syntax error: {self}"),
            ErrorKind::Runtime
            | ErrorKind::ResourceExhausted
            | ErrorKind::FileSystem
            | ErrorKind::Argument => format!("Liquid error: {self}"),
        }
    }
}
