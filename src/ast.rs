use std::fmt;

use crate::context::Context;
use crate::drop::AsAny;
use crate::error::{LoquatResult, ParseError};
use crate::expression::Output;

pub type NodeList = Vec<Node>;

/// A parsed tag. Tags are immutable once parsed; everything that changes
/// between renders lives in the [`Context`].
pub trait Tag: AsAny + fmt::Debug + Send + Sync {
    /// The name the tag was registered under.
    fn name(&self) -> &str;

    fn render(&self, context: &mut Context, out: &mut String) -> LoquatResult<()>;

    /// Every node list owned by the tag, in source order.
    fn children(&self) -> Vec<&[Node]> {
        Vec::new()
    }

    /// Checked before the tag is appended; `siblings` are the nodes preceding it.
    fn assert_rules(&self, siblings: &[Node]) -> Result<(), ParseError> {
        let _ = siblings;
        Ok(())
    }
}

#[derive(Debug)]
pub enum Node {
    Text(String),
    Output(Output),
    Tag(Box<dyn Tag>),
}

impl Node {
    pub fn render(&self, context: &mut Context, out: &mut String) -> LoquatResult<()> {
        match self {
            Self::Text(text) => {
                out.push_str(text);
                Ok(())
            }
            Self::Output(output) => output.render(context, out),
            Self::Tag(tag) => tag.render(context, out),
        }
    }

    pub fn as_tag<T: Tag + 'static>(&self) -> Option<&T> {
        match self {
            Self::Tag(tag) => AsAny::as_any(tag.as_ref()).downcast_ref::<T>(),
            Self::Text(_) | Self::Output(_) => None,
        }
    }

    /// True for text nodes made only of whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Output(_) | Self::Tag(_) => false,
        }
    }
}

/// Renders each node in turn. A failing node is replaced by its error text
/// unless the context rethrows errors.
pub fn render_all(nodes: &[Node], context: &mut Context, out: &mut String) -> LoquatResult<()> {
    for node in nodes {
        if let Err(error) = node.render(context, out) {
            if context.is_aborting() {
                return Err(error);
            }
            let message = context.handle_error(error)?;
            out.push_str(&message);
        }
    }
    Ok(())
}

/// Depth-first walk over `nodes` and the children of every tag.
pub fn walk<'n>(nodes: &'n [Node], visit: &mut impl FnMut(&'n Node)) {
    for node in nodes {
        visit(node);
        if let Node::Tag(tag) = node {
            for children in tag.children() {
                walk(children, visit);
            }
        }
    }
}

/// The root of a parsed template.
#[derive(Debug, Default)]
pub struct Document {
    pub nodes: NodeList,
}

impl Document {
    pub fn render(&self, context: &mut Context, out: &mut String) -> LoquatResult<()> {
        render_all(&self.nodes, context, out)
    }
}
