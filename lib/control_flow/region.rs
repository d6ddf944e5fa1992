//! Structured regions of a control-flow graph.
//!
//! Every basic block lives in exactly one scope region. Scopes nest inside
//! guarded regions (a `try` block with its handlers) and handler regions,
//! which nest inside scopes again, forming a tree rooted at a single scope.
//!
//! Regions are stored in an arena owned by the `RegionTree` and referred to
//! by `RegionId`. Blocks are referred to by the offset of their first
//! instruction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::cil::ExceptionHandlerKind;
use crate::Error;

/// A handle to a region in a `RegionTree`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct RegionId(usize);

impl RegionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "region_{}", self.0)
    }
}

/// A child of a scope region.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum RegionChild {
    Block(u32),
    Region(RegionId),
}

/// An ordered sequence of blocks and nested regions.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ScopeRegion {
    children: Vec<RegionChild>,
    entry: Option<RegionChild>,
}

impl ScopeRegion {
    pub fn children(&self) -> &[RegionChild] {
        &self.children
    }

    /// The child holding the lowest offset of this scope.
    pub fn entry(&self) -> Option<RegionChild> {
        self.entry
    }
}

/// A protected scope and the handlers guarding it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GuardedRegion {
    protected: RegionId,
    handlers: Vec<RegionId>,
}

impl GuardedRegion {
    pub fn protected(&self) -> RegionId {
        self.protected
    }

    pub fn handlers(&self) -> &[RegionId] {
        &self.handlers
    }
}

/// One exception handler. Filters have a prologue scope holding the filter
/// code.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HandlerRegion {
    kind: ExceptionHandlerKind,
    prologue: Option<RegionId>,
    contents: RegionId,
    epilogue: Option<RegionId>,
}

impl HandlerRegion {
    pub fn kind(&self) -> &ExceptionHandlerKind {
        &self.kind
    }

    pub fn prologue(&self) -> Option<RegionId> {
        self.prologue
    }

    pub fn contents(&self) -> RegionId {
        self.contents
    }

    pub fn epilogue(&self) -> Option<RegionId> {
        self.epilogue
    }

    /// The scopes of this handler in execution order.
    pub fn scopes(&self) -> Vec<RegionId> {
        self.prologue
            .into_iter()
            .chain(Some(self.contents))
            .chain(self.epilogue)
            .collect()
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Region {
    Scope(ScopeRegion),
    Guarded(GuardedRegion),
    Handler(HandlerRegion),
}

impl Region {
    /// Dispatch to the visitor method for this region's shape.
    pub fn accept<V: RegionVisitor>(&self, tree: &RegionTree, id: RegionId, visitor: &mut V) -> V::Output {
        match self {
            Region::Scope(scope) => visitor.visit_scope(tree, id, scope),
            Region::Guarded(guarded) => visitor.visit_guarded(tree, id, guarded),
            Region::Handler(handler) => visitor.visit_handler(tree, id, handler),
        }
    }

    pub fn as_scope(&self) -> Option<&ScopeRegion> {
        match self {
            Region::Scope(scope) => Some(scope),
            _ => None,
        }
    }

    pub fn as_guarded(&self) -> Option<&GuardedRegion> {
        match self {
            Region::Guarded(guarded) => Some(guarded),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&HandlerRegion> {
        match self {
            Region::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    /// The regions directly beneath this one.
    fn child_regions(&self) -> Vec<RegionId> {
        match self {
            Region::Scope(scope) => scope
                .children
                .iter()
                .filter_map(|child| match child {
                    RegionChild::Region(id) => Some(*id),
                    RegionChild::Block(_) => None,
                })
                .collect(),
            Region::Guarded(guarded) => Some(guarded.protected)
                .into_iter()
                .chain(guarded.handlers.iter().copied())
                .collect(),
            Region::Handler(handler) => handler.scopes(),
        }
    }
}

/// A visitor over the three region shapes.
pub trait RegionVisitor {
    type Output;

    fn visit_scope(&mut self, tree: &RegionTree, id: RegionId, scope: &ScopeRegion) -> Self::Output;
    fn visit_guarded(&mut self, tree: &RegionTree, id: RegionId, guarded: &GuardedRegion) -> Self::Output;
    fn visit_handler(&mut self, tree: &RegionTree, id: RegionId, handler: &HandlerRegion) -> Self::Output;
}

/// The regions of a newly added handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HandlerScopes {
    pub handler: RegionId,
    pub prologue: Option<RegionId>,
    pub contents: RegionId,
}

/// The region tree of one control-flow graph.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RegionTree {
    regions: Vec<Region>,
    parents: Vec<Option<RegionId>>,
    blocks: BTreeMap<u32, RegionId>,
}

impl Default for RegionTree {
    fn default() -> Self {
        RegionTree::new()
    }
}

impl RegionTree {
    /// Create a tree holding only an empty root scope.
    pub fn new() -> RegionTree {
        RegionTree {
            regions: vec![Region::Scope(ScopeRegion::default())],
            parents: vec![None],
            blocks: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> RegionId {
        RegionId(0)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn region(&self, id: RegionId) -> Result<&Region, Error> {
        self.regions.get(id.0).ok_or(Error::RegionNotFound(id.0))
    }

    fn region_mut(&mut self, id: RegionId) -> Result<&mut Region, Error> {
        self.regions.get_mut(id.0).ok_or(Error::RegionNotFound(id.0))
    }

    fn scope_mut(&mut self, id: RegionId) -> Result<&mut ScopeRegion, Error> {
        match self.region_mut(id)? {
            Region::Scope(scope) => Ok(scope),
            _ => Err(Error::RegionNotScope(id.0)),
        }
    }

    pub fn scope(&self, id: RegionId) -> Result<&ScopeRegion, Error> {
        self.region(id)?.as_scope().ok_or(Error::RegionNotScope(id.0))
    }

    /// Every region id, in creation order.
    pub fn region_ids(&self) -> Vec<RegionId> {
        (0..self.regions.len()).map(RegionId).collect()
    }

    pub fn parent(&self, id: RegionId) -> Result<Option<RegionId>, Error> {
        self.parents.get(id.0).copied().ok_or(Error::RegionNotFound(id.0))
    }

    /// The scope which directly holds the block at `offset`.
    pub fn region_of_block(&self, offset: u32) -> Option<RegionId> {
        self.blocks.get(&offset).copied()
    }

    fn push(&mut self, region: Region, parent: RegionId) -> RegionId {
        self.regions.push(region);
        self.parents.push(Some(parent));
        RegionId(self.regions.len() - 1)
    }

    fn push_scope(&mut self, parent: RegionId) -> RegionId {
        self.push(Region::Scope(ScopeRegion::default()), parent)
    }

    /// Add a guarded region as the last child of `scope`. Returns the guarded
    /// region and its protected scope.
    pub fn add_guarded(&mut self, scope: RegionId) -> Result<(RegionId, RegionId), Error> {
        self.scope(scope)?;
        let guarded = self.push(
            Region::Guarded(GuardedRegion {
                protected: RegionId(usize::MAX),
                handlers: Vec::new(),
            }),
            scope,
        );
        let protected = self.push_scope(guarded);
        if let Region::Guarded(region) = self.region_mut(guarded)? {
            region.protected = protected;
        }
        self.scope_mut(scope)?.children.push(RegionChild::Region(guarded));
        Ok((guarded, protected))
    }

    /// Add a handler to a guarded region. Filters get a prologue scope.
    pub fn add_handler(&mut self, guarded: RegionId, kind: ExceptionHandlerKind) -> Result<HandlerScopes, Error> {
        if self.region(guarded)?.as_guarded().is_none() {
            return Err(format!("{} is not a guarded region", guarded).into());
        }
        let has_prologue = matches!(kind, ExceptionHandlerKind::Filter { .. });
        let handler = self.push(
            Region::Handler(HandlerRegion {
                kind,
                prologue: None,
                contents: RegionId(usize::MAX),
                epilogue: None,
            }),
            guarded,
        );
        let prologue = if has_prologue {
            Some(self.push_scope(handler))
        } else {
            None
        };
        let contents = self.push_scope(handler);
        if let Region::Handler(region) = self.region_mut(handler)? {
            region.prologue = prologue;
            region.contents = contents;
        }
        if let Region::Guarded(region) = self.region_mut(guarded)? {
            region.handlers.push(handler);
        }
        Ok(HandlerScopes {
            handler,
            prologue,
            contents,
        })
    }

    /// Place a block in a scope.
    pub fn add_block(&mut self, scope: RegionId, offset: u32) -> Result<(), Error> {
        if self.blocks.contains_key(&offset) {
            return Err(Error::BlockAlreadyPlaced(offset as usize));
        }
        self.scope_mut(scope)?.children.push(RegionChild::Block(offset));
        self.blocks.insert(offset, scope);
        Ok(())
    }

    fn child_offset(&self, child: &RegionChild) -> u32 {
        match child {
            RegionChild::Block(offset) => *offset,
            RegionChild::Region(id) => self.first_block(*id).ok().flatten().unwrap_or(u32::MAX),
        }
    }

    /// Order the children of every scope by offset and pick each scope's
    /// entry.
    pub fn sort_children(&mut self) {
        for index in 0..self.regions.len() {
            let mut children = match &self.regions[index] {
                Region::Scope(scope) => scope.children.clone(),
                _ => continue,
            };
            children.sort_by_key(|child| self.child_offset(child));
            if let Region::Scope(scope) = &mut self.regions[index] {
                scope.entry = children.first().copied();
                scope.children = children;
            }
        }
    }

    /// Run a visitor over a region.
    pub fn accept<V: RegionVisitor>(&self, id: RegionId, visitor: &mut V) -> Result<V::Output, Error> {
        Ok(self.region(id)?.accept(self, id, visitor))
    }

    /// Every block beneath `id`, in pre-order.
    pub fn blocks(&self, id: RegionId) -> Result<Vec<u32>, Error> {
        self.accept(id, &mut BlockCollector::default())
    }

    pub fn first_block(&self, id: RegionId) -> Result<Option<u32>, Error> {
        self.accept(id, &mut FirstBlock)
    }

    /// The last block of a region. For a guarded region this is the first
    /// block of its last handler that has any blocks.
    pub fn last_block(&self, id: RegionId) -> Result<Option<u32>, Error> {
        self.accept(id, &mut LastBlock)
    }

    /// The depth of the deepest region beneath `id`, counting `id` as 1.
    pub fn nesting_depth(&self, id: RegionId) -> Result<usize, Error> {
        self.accept(id, &mut NestingDepth)
    }

    /// The number of ancestors of `id`.
    pub fn depth(&self, id: RegionId) -> Result<usize, Error> {
        let mut depth = 0;
        let mut current = self.parent(id)?;
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent)?;
        }
        Ok(depth)
    }

    /// Returns true if `ancestor` is `id` or contains it.
    pub fn contains(&self, ancestor: RegionId, id: RegionId) -> Result<bool, Error> {
        let mut current = Some(id);
        while let Some(region) = current {
            if region == ancestor {
                return Ok(true);
            }
            current = self.parent(region)?;
        }
        Ok(false)
    }

    /// The direct child regions of `id`.
    pub fn child_regions(&self, id: RegionId) -> Result<Vec<RegionId>, Error> {
        Ok(self.region(id)?.child_regions())
    }
}

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<u32>,
}

impl BlockCollector {
    fn descend(&mut self, tree: &RegionTree, id: RegionId) {
        if let Ok(region) = tree.region(id) {
            region.accept(tree, id, self);
        }
    }
}

impl RegionVisitor for BlockCollector {
    type Output = Vec<u32>;

    fn visit_scope(&mut self, tree: &RegionTree, _: RegionId, scope: &ScopeRegion) -> Vec<u32> {
        for child in scope.children() {
            match child {
                RegionChild::Block(offset) => self.blocks.push(*offset),
                RegionChild::Region(id) => self.descend(tree, *id),
            }
        }
        self.blocks.clone()
    }

    fn visit_guarded(&mut self, tree: &RegionTree, _: RegionId, guarded: &GuardedRegion) -> Vec<u32> {
        self.descend(tree, guarded.protected);
        for handler in guarded.handlers() {
            self.descend(tree, *handler);
        }
        self.blocks.clone()
    }

    fn visit_handler(&mut self, tree: &RegionTree, _: RegionId, handler: &HandlerRegion) -> Vec<u32> {
        for scope in handler.scopes() {
            self.descend(tree, scope);
        }
        self.blocks.clone()
    }
}

struct FirstBlock;

impl FirstBlock {
    fn of(&mut self, tree: &RegionTree, id: RegionId) -> Option<u32> {
        tree.region(id).ok().and_then(|region| region.accept(tree, id, self))
    }
}

impl RegionVisitor for FirstBlock {
    type Output = Option<u32>;

    fn visit_scope(&mut self, tree: &RegionTree, _: RegionId, scope: &ScopeRegion) -> Option<u32> {
        scope.children().iter().find_map(|child| match child {
            RegionChild::Block(offset) => Some(*offset),
            RegionChild::Region(id) => self.of(tree, *id),
        })
    }

    fn visit_guarded(&mut self, tree: &RegionTree, _: RegionId, guarded: &GuardedRegion) -> Option<u32> {
        self.of(tree, guarded.protected)
            .or_else(|| guarded.handlers().iter().find_map(|handler| self.of(tree, *handler)))
    }

    fn visit_handler(&mut self, tree: &RegionTree, _: RegionId, handler: &HandlerRegion) -> Option<u32> {
        handler.scopes().into_iter().find_map(|scope| self.of(tree, scope))
    }
}

struct LastBlock;

impl LastBlock {
    fn of(&mut self, tree: &RegionTree, id: RegionId) -> Option<u32> {
        tree.region(id).ok().and_then(|region| region.accept(tree, id, self))
    }
}

impl RegionVisitor for LastBlock {
    type Output = Option<u32>;

    fn visit_scope(&mut self, tree: &RegionTree, _: RegionId, scope: &ScopeRegion) -> Option<u32> {
        scope.children().iter().rev().find_map(|child| match child {
            RegionChild::Block(offset) => Some(*offset),
            RegionChild::Region(id) => self.of(tree, *id),
        })
    }

    fn visit_guarded(&mut self, tree: &RegionTree, _: RegionId, guarded: &GuardedRegion) -> Option<u32> {
        guarded
            .handlers()
            .iter()
            .rev()
            .find_map(|handler| FirstBlock.of(tree, *handler))
            .or_else(|| self.of(tree, guarded.protected))
    }

    fn visit_handler(&mut self, tree: &RegionTree, _: RegionId, handler: &HandlerRegion) -> Option<u32> {
        handler.scopes().into_iter().rev().find_map(|scope| self.of(tree, scope))
    }
}

struct NestingDepth;

impl NestingDepth {
    fn deepest(&mut self, tree: &RegionTree, ids: Vec<RegionId>) -> usize {
        ids.into_iter()
            .filter_map(|id| tree.region(id).ok().map(|region| region.accept(tree, id, self)))
            .max()
            .unwrap_or(0)
    }
}

impl RegionVisitor for NestingDepth {
    type Output = usize;

    fn visit_scope(&mut self, tree: &RegionTree, id: RegionId, _: &ScopeRegion) -> usize {
        1 + self.deepest(tree, tree.child_regions(id).unwrap_or_default())
    }

    fn visit_guarded(&mut self, tree: &RegionTree, id: RegionId, _: &GuardedRegion) -> usize {
        1 + self.deepest(tree, tree.child_regions(id).unwrap_or_default())
    }

    fn visit_handler(&mut self, tree: &RegionTree, id: RegionId, _: &HandlerRegion) -> usize {
        1 + self.deepest(tree, tree.child_regions(id).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /*
     * root
     *  +-- 0
     *  +-- guarded
     *  |    +-- protected: 2, 6
     *  |    +-- finally: 10
     *  +-- 12
     */
    fn try_finally() -> (RegionTree, RegionId) {
        let mut tree = RegionTree::new();
        let root = tree.root();
        tree.add_block(root, 12).unwrap();
        let (guarded, protected) = tree.add_guarded(root).unwrap();
        tree.add_block(root, 0).unwrap();
        tree.add_block(protected, 6).unwrap();
        tree.add_block(protected, 2).unwrap();
        let handler = tree.add_handler(guarded, ExceptionHandlerKind::Finally).unwrap();
        tree.add_block(handler.contents, 10).unwrap();
        tree.sort_children();
        (tree, guarded)
    }

    #[test]
    fn blocks_in_pre_order() {
        let (tree, guarded) = try_finally();

        assert_eq!(tree.blocks(tree.root()).unwrap(), vec![0, 2, 6, 10, 12]);
        assert_eq!(tree.blocks(guarded).unwrap(), vec![2, 6, 10]);
        assert_eq!(tree.first_block(guarded).unwrap(), Some(2));
        assert_eq!(tree.scope(tree.root()).unwrap().entry(), Some(RegionChild::Block(0)));
    }

    #[test]
    fn last_block_of_guarded_region_is_first_block_of_last_handler() {
        let (tree, guarded) = try_finally();

        assert_eq!(tree.last_block(guarded).unwrap(), Some(10));
        assert_eq!(tree.last_block(tree.root()).unwrap(), Some(12));
    }

    #[test]
    fn last_block_falls_back_to_protected_scope() {
        let mut tree = RegionTree::new();
        let (guarded, protected) = tree.add_guarded(tree.root()).unwrap();
        tree.add_block(protected, 0).unwrap();
        tree.add_block(protected, 4).unwrap();
        tree.add_handler(guarded, ExceptionHandlerKind::Fault).unwrap();
        tree.sort_children();

        assert_eq!(tree.last_block(guarded).unwrap(), Some(4));
    }

    #[test]
    fn placement_errors() {
        let (mut tree, guarded) = try_finally();

        assert!(matches!(tree.add_block(guarded, 20), Err(Error::RegionNotScope(_))));
        assert!(matches!(tree.add_block(tree.root(), 6), Err(Error::BlockAlreadyPlaced(6))));
        assert!(tree.add_handler(tree.root(), ExceptionHandlerKind::Fault).is_err());
    }

    #[test]
    fn depth_and_containment() {
        let (tree, guarded) = try_finally();
        let protected = tree.region(guarded).unwrap().as_guarded().unwrap().protected();

        assert_eq!(tree.region_of_block(6), Some(protected));
        assert_eq!(tree.depth(protected).unwrap(), 2);
        assert_eq!(tree.nesting_depth(tree.root()).unwrap(), 4);
        assert!(tree.contains(tree.root(), protected).unwrap());
        assert!(!tree.contains(protected, guarded).unwrap());
    }

    #[test]
    fn filters_have_a_prologue() {
        let mut tree = RegionTree::new();
        let (guarded, protected) = tree.add_guarded(tree.root()).unwrap();
        tree.add_block(protected, 0).unwrap();
        let handler = tree
            .add_handler(guarded, ExceptionHandlerKind::Filter { filter_start: 8 })
            .unwrap();
        tree.add_block(handler.prologue.unwrap(), 8).unwrap();
        tree.add_block(handler.contents, 14).unwrap();
        tree.sort_children();

        assert_eq!(tree.first_block(handler.handler).unwrap(), Some(8));
        assert_eq!(tree.last_block(handler.handler).unwrap(), Some(14));
        assert_eq!(tree.last_block(guarded).unwrap(), Some(8));
    }

    #[test]
    fn visitors_dispatch_on_shape() {
        struct Shapes(Vec<&'static str>);

        impl RegionVisitor for Shapes {
            type Output = ();

            fn visit_scope(&mut self, _: &RegionTree, _: RegionId, _: &ScopeRegion) {
                self.0.push("scope");
            }
            fn visit_guarded(&mut self, _: &RegionTree, _: RegionId, _: &GuardedRegion) {
                self.0.push("guarded");
            }
            fn visit_handler(&mut self, _: &RegionTree, _: RegionId, _: &HandlerRegion) {
                self.0.push("handler");
            }
        }

        let (tree, _) = try_finally();
        let mut shapes = Shapes(Vec::new());
        for id in tree.region_ids() {
            tree.accept(id, &mut shapes).unwrap();
        }
        assert_eq!(shapes.0, vec!["scope", "guarded", "scope", "handler", "scope"]);
    }
}
