//! Template inheritance: `extends` and `block`.
//!
//! A template that starts with `{% extends 'parent' %}` renders the parent in
//! its place, with the child's blocks replacing the parent's blocks of the
//! same name. Chains of any length are resolved while the chain renders: each
//! `extends` maps the blocks it knows about onto the template it extends and
//! hands blocks with no counterpart further up as orphans.
//!
//! Inside a block, `{{ block.super }}` renders the body it replaced.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::ast::{Node, NodeList, Tag, render_all, walk};
use crate::context::Context;
use crate::drop::{LiquidDrop, MemberTable};
use crate::error::{Location, LoquatResult, ParseError, ParseErrorKind};
use crate::expression::{Expression, QUOTED_FRAGMENT};
use crate::parser::{Parser, TagHeader};
use crate::tags::comment::CommentTag;
use crate::tags::load_template;
use crate::template::Template;
use crate::value::Value;

static BLOCK_SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)$").expect("valid regex"));
static EXTENDS_SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^({QUOTED_FRAGMENT})")).expect("valid regex"));

/// Identity of a block body during one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum BlockId {
    /// A parsed `block` tag, by address. Every template involved is kept
    /// alive by [`BlockRenderState`] for the whole render.
    Node(usize),
    /// A body reachable only through `block.super`.
    Synthetic(usize),
}

#[derive(Debug, Clone)]
struct BlockBody {
    id: BlockId,
    name: String,
    nodes: Arc<NodeList>,
}

impl BlockBody {
    fn of(block: &BlockTag) -> Self {
        Self {
            id: block.id(),
            name: block.name.clone(),
            nodes: Arc::clone(&block.body),
        }
    }
}

/// Per-render bookkeeping for an `extends` chain.
#[derive(Debug, Default)]
pub struct BlockRenderState {
    /// Body to render in place of a block's own.
    node_lists: HashMap<BlockId, Arc<NodeList>>,
    /// Body `block.super` renders for a block.
    parents: HashMap<BlockId, BlockBody>,
    /// Child blocks not yet matched to a block further up the chain.
    orphans: Vec<BlockBody>,
    templates: Vec<Arc<Template>>,
    next_synthetic: usize,
}

impl BlockRenderState {
    fn node_list(&self, id: BlockId) -> Option<Arc<NodeList>> {
        self.node_lists.get(&id).map(Arc::clone)
    }

    /// Appends `nodes` to the end of `id`'s super chain.
    fn add_parent(&mut self, id: BlockId, name: &str, nodes: Arc<NodeList>) {
        let mut last = id;
        while let Some(parent) = self.parents.get(&last) {
            last = parent.id;
        }
        let synthetic = BlockId::Synthetic(self.next_synthetic);
        self.next_synthetic = self.next_synthetic.saturating_add(1);
        self.parents.insert(
            last,
            BlockBody {
                id: synthetic,
                name: name.to_string(),
                nodes,
            },
        );
    }

    /// Maps `children` onto the blocks of `parent`.
    fn inherit(&mut self, children: Vec<BlockBody>, parent: &Arc<Template>) {
        let mut parent_blocks = Vec::new();
        walk(parent.root(), &mut |node: &Node| {
            if let Some(block) = node.as_tag::<BlockTag>() {
                parent_blocks.push(BlockBody::of(block));
            }
        });
        let parent_extends = parent
            .root()
            .iter()
            .any(|node| node.as_tag::<ExtendsTag>().is_some());

        let mut pending = children;
        pending.append(&mut self.orphans);
        for block in pending {
            let Some(replaced) = parent_blocks.iter().find(|candidate| candidate.name == block.name)
            else {
                if parent_extends {
                    self.orphans.push(block);
                }
                continue;
            };

            if let Some(super_body) = self.parents.get(&block.id).cloned() {
                self.parents.insert(replaced.id, super_body);
            }
            let replaced_nodes = self
                .node_list(replaced.id)
                .unwrap_or_else(|| Arc::clone(&replaced.nodes));
            self.add_parent(replaced.id, &replaced.name, replaced_nodes);
            let nodes = self
                .node_list(block.id)
                .unwrap_or_else(|| Arc::clone(&block.nodes));
            self.node_lists.insert(replaced.id, nodes);
        }

        self.templates.push(Arc::clone(parent));
    }
}

/// `{% extends 'parent' %}`. Must come first and consumes the rest of the
/// template; only its `block` tags matter.
#[derive(Debug)]
pub struct ExtendsTag {
    template_name: Expression,
    body: NodeList,
    location: Location,
}

pub fn parse_extends(
    header: &TagHeader<'_>,
    parser: &mut Parser<'_>,
) -> Result<Box<dyn Tag>, ParseError> {
    let template_name = EXTENDS_SYNTAX
        .captures(header.markup)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| header.syntax_error("extends '[template]'"))?;
    let template_name = Expression::parse(template_name.as_str(), parser.config());

    let (body, _) = parser.parse_body(None, &[])?;
    if body.iter().any(|node| node.as_tag::<ExtendsTag>().is_some()) {
        return Err(header.error(ParseErrorKind::ExtendsRepeated));
    }

    Ok(Box::new(ExtendsTag {
        template_name,
        body,
        location: header.location,
    }))
}

impl ExtendsTag {
    fn blocks(&self) -> impl Iterator<Item = &BlockTag> {
        self.body.iter().filter_map(Node::as_tag::<BlockTag>)
    }
}

impl Tag for ExtendsTag {
    fn name(&self) -> &str {
        "extends"
    }

    fn render(&self, context: &mut Context, out: &mut String) -> LoquatResult<()> {
        let name = context.evaluate(&self.template_name)?;
        let name = context.to_output(&name);
        context.with_partial(&name, |context| {
            let parent = load_template(context, &name)?;

            let owner = context.block_state().is_none();
            if owner {
                context.replace_block_state(Some(BlockRenderState::default()));
            }
            if let Some(state) = context.block_state_mut() {
                state.inherit(self.blocks().map(BlockBody::of).collect(), &parent);
            }

            let result = parent.render_nodes(context, out);
            if owner {
                context.replace_block_state(None);
            }
            result
        })
    }

    fn children(&self) -> Vec<&[Node]> {
        vec![&self.body]
    }

    fn assert_rules(&self, siblings: &[Node]) -> Result<(), ParseError> {
        let leading_only = siblings
            .iter()
            .all(|node| node.is_blank() || node.as_tag::<CommentTag>().is_some());
        if leading_only {
            Ok(())
        } else {
            Err(ParseError::new(ParseErrorKind::ExtendsNotFirst, self.location))
        }
    }
}

/// `{% block name %}default{% endblock %}`, a region a child template may
/// replace.
#[derive(Debug)]
pub struct BlockTag {
    name: String,
    body: Arc<NodeList>,
    location: Location,
}

pub fn parse_block(
    header: &TagHeader<'_>,
    parser: &mut Parser<'_>,
) -> Result<Box<dyn Tag>, ParseError> {
    let name = BLOCK_SYNTAX
        .captures(header.markup)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| header.syntax_error("block [name]"))?
        .as_str()
        .to_string();
    let (body, _) = parser.parse_body(Some("block"), &[])?;
    Ok(Box::new(BlockTag {
        name,
        body: Arc::new(body),
        location: header.location,
    }))
}

impl BlockTag {
    pub fn block_name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> BlockId {
        BlockId::Node(std::ptr::from_ref(self).addr())
    }
}

impl Tag for BlockTag {
    fn name(&self) -> &str {
        "block"
    }

    fn render(&self, context: &mut Context, out: &mut String) -> LoquatResult<()> {
        render_block(context, self.id(), &self.body, out)
    }

    fn children(&self) -> Vec<&[Node]> {
        vec![self.body.as_slice()]
    }

    fn assert_rules(&self, siblings: &[Node]) -> Result<(), ParseError> {
        let duplicate = siblings
            .iter()
            .filter_map(Node::as_tag::<BlockTag>)
            .any(|block| block.name == self.name);
        if duplicate {
            Err(ParseError::new(
                ParseErrorKind::DuplicateBlock {
                    name: self.name.clone(),
                },
                self.location,
            ))
        } else {
            Ok(())
        }
    }
}

fn render_block(
    context: &mut Context,
    id: BlockId,
    own: &Arc<NodeList>,
    out: &mut String,
) -> LoquatResult<()> {
    let nodes = context
        .block_state()
        .and_then(|state| state.node_list(id))
        .unwrap_or_else(|| Arc::clone(own));
    context.with_stack(|context| {
        context.set("block", Value::from_drop(BlockDrop { id }));
        render_all(&nodes, context, out)
    })
}

/// The `block` variable inside a block body.
struct BlockDrop {
    id: BlockId,
}

static BLOCK_MEMBERS: LazyLock<MemberTable<BlockDrop>> =
    LazyLock::new(|| MemberTable::new().property("super", BlockDrop::render_super));

impl BlockDrop {
    fn render_super(&self, context: &mut Context) -> LoquatResult<Value> {
        let Some(parent) = context
            .block_state()
            .and_then(|state| state.parents.get(&self.id))
            .cloned()
        else {
            return Ok(Value::Nil);
        };
        let mut rendered = String::new();
        render_block(context, parent.id, &parent.nodes, &mut rendered)?;
        Ok(Value::Str(rendered))
    }
}

impl LiquidDrop for BlockDrop {
    fn declared_member(&self, name: &str, context: &mut Context) -> Option<LoquatResult<Value>> {
        BLOCK_MEMBERS.resolve(self, name, context)
    }
}
