// Copyright 2025 arbor contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A minimal host language for integration tests: a mutable tree of tagged
//! nodes, a wrapper implementation calling the probe entry points in the
//! required try/finally discipline, and listener helpers recording events.

#![allow(dead_code)] // each test binary uses a different subset

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use arbor_core::{Source, SourceId, SourceSpan, Tag, TagSet};
use arbor_instrument::{
    same_node, DispatchError, EventContext, EventNodeFactory, ExecuteSourceListener,
    ExecutionEventListener, ExecutionEventNode, Frame, GuestException, InstrumentError,
    InstrumentableNode, LanguageInfo, ListenerError, LoadSourceListener, LoadSpanListener,
    NodeRef, OutputConsumer, Probe, RootNode, WrapperNode,
};

pub fn language() -> LanguageInfo {
    LanguageInfo::new(
        "toylang",
        TagSet::of(&[Tag::ROOT, Tag::STATEMENT, Tag::CALL, Tag::EXPRESSION]),
    )
}

pub fn source(id: u64) -> Source {
    Source::new(SourceId(id), format!("script-{id}.toy"), Some("application/x-toy"))
}

pub fn span(src: &Source, line: u32) -> SourceSpan {
    SourceSpan::new(src.clone(), line * 100, 10, line, line)
}

pub fn statements() -> TagSet {
    TagSet::from(Tag::STATEMENT)
}

// ---------------------------------------------------------------------------
// Host tree
// ---------------------------------------------------------------------------

pub struct TestNode {
    me: Weak<TestNode>,
    pub label: String,
    tags: TagSet,
    span: Option<SourceSpan>,
    instrumentable: bool,
    allow_replacement: AtomicBool,
    fail_on_execute: AtomicBool,
    parent: RwLock<Weak<dyn InstrumentableNode>>,
    children: RwLock<Vec<NodeRef>>,
}

impl TestNode {
    pub fn new(label: &str, tags: TagSet, span: Option<SourceSpan>) -> Arc<TestNode> {
        Self::build(label, tags, span, true)
    }

    /// A node that never opted into instrumentation, tags notwithstanding.
    pub fn opaque(label: &str, tags: TagSet, span: Option<SourceSpan>) -> Arc<TestNode> {
        Self::build(label, tags, span, false)
    }

    fn build(
        label: &str,
        tags: TagSet,
        span: Option<SourceSpan>,
        instrumentable: bool,
    ) -> Arc<TestNode> {
        Arc::new_cyclic(|me| TestNode {
            me: me.clone(),
            label: label.to_string(),
            tags,
            span,
            instrumentable,
            allow_replacement: AtomicBool::new(true),
            fail_on_execute: AtomicBool::new(false),
            parent: RwLock::new(empty_parent()),
            children: RwLock::new(Vec::new()),
        })
    }

    pub fn add_child(self: &Arc<Self>, child: &Arc<TestNode>) {
        *child.parent.write().unwrap() = self.me_dyn();
        self.children.write().unwrap().push(child.clone() as NodeRef);
    }

    /// Makes every replacement under this node unsafe.
    pub fn veto_replacements(&self) {
        self.allow_replacement.store(false, Ordering::Release);
    }

    /// Makes executing this node raise a guest exception.
    pub fn fail_on_execute(&self) {
        self.fail_on_execute.store(true, Ordering::Release);
    }

    fn me_dyn(&self) -> Weak<dyn InstrumentableNode> {
        self.me.clone()
    }
}

fn empty_parent() -> Weak<dyn InstrumentableNode> {
    Weak::<TestNode>::new()
}

impl InstrumentableNode for TestNode {
    fn parent(&self) -> Option<NodeRef> {
        self.parent.read().unwrap().upgrade()
    }

    fn children(&self) -> Vec<NodeRef> {
        self.children.read().unwrap().clone()
    }

    fn span(&self) -> Option<SourceSpan> {
        self.span.clone()
    }

    fn resolved_tags(&self) -> TagSet {
        self.tags
    }

    fn is_instrumentable(&self) -> bool {
        self.instrumentable
    }

    fn create_wrapper(self: Arc<Self>, probe: Arc<Probe>) -> Option<Arc<dyn WrapperNode>> {
        if !self.instrumentable {
            return None;
        }
        let parent = self.parent.read().unwrap().clone();
        Some(TestWrapper::new(probe, self as NodeRef, parent))
    }

    fn replace_child(&self, old: &NodeRef, new: NodeRef) -> Result<(), InstrumentError> {
        {
            let mut children = self.children.write().unwrap();
            let Some(slot) = children.iter_mut().find(|c| same_node(c, old)) else {
                return Err(InstrumentError::ReplacementFailed(format!(
                    "'{}' has no such child",
                    self.label
                )));
            };
            *slot = new.clone();
        }
        readopt(self.me_dyn(), &new, old);
        Ok(())
    }

    fn is_replacement_safe(&self, _old: &NodeRef, _replacement: &NodeRef) -> bool {
        self.allow_replacement.load(Ordering::Acquire)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Fixes parent links after a splice: the new child hangs under `parent`,
/// and when the new child wraps the old one, the old child hangs under the
/// wrapper.
fn readopt(parent: Weak<dyn InstrumentableNode>, new: &NodeRef, old: &NodeRef) {
    if let Some(node) = new.as_any().downcast_ref::<TestNode>() {
        *node.parent.write().unwrap() = parent;
    } else if let Some(wrapper) = new.as_any().downcast_ref::<TestWrapper>() {
        *wrapper.parent.write().unwrap() = parent;
        let delegate = wrapper.delegate();
        if same_node(&delegate, old) {
            if let Some(inner) = delegate.as_any().downcast_ref::<TestNode>() {
                *inner.parent.write().unwrap() = wrapper.me.clone();
            }
        }
    }
}

pub struct TestWrapper {
    me: Weak<TestWrapper>,
    probe: Arc<Probe>,
    delegate: NodeRef,
    parent: RwLock<Weak<dyn InstrumentableNode>>,
}

impl TestWrapper {
    fn new(
        probe: Arc<Probe>,
        delegate: NodeRef,
        parent: Weak<dyn InstrumentableNode>,
    ) -> Arc<dyn WrapperNode> {
        Arc::new_cyclic(|me| TestWrapper {
            me: me.clone(),
            probe,
            delegate,
            parent: RwLock::new(parent),
        })
    }
}

impl InstrumentableNode for TestWrapper {
    fn parent(&self) -> Option<NodeRef> {
        self.parent.read().unwrap().upgrade()
    }

    fn children(&self) -> Vec<NodeRef> {
        vec![self.delegate.clone()]
    }

    fn span(&self) -> Option<SourceSpan> {
        self.delegate.span()
    }

    fn resolved_tags(&self) -> TagSet {
        self.delegate.resolved_tags()
    }

    fn is_instrumentable(&self) -> bool {
        false
    }

    fn as_wrapper(&self) -> Option<&dyn WrapperNode> {
        Some(self)
    }

    fn create_wrapper(self: Arc<Self>, _probe: Arc<Probe>) -> Option<Arc<dyn WrapperNode>> {
        None
    }

    fn replace_child(&self, _old: &NodeRef, _new: NodeRef) -> Result<(), InstrumentError> {
        Err(InstrumentError::ReplacementFailed(
            "wrapper children are fixed".to_string(),
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl WrapperNode for TestWrapper {
    fn delegate(&self) -> NodeRef {
        self.delegate.clone()
    }

    fn probe(&self) -> Arc<Probe> {
        self.probe.clone()
    }

    fn as_node(self: Arc<Self>) -> NodeRef {
        self
    }
}

pub struct TestRoot {
    language: LanguageInfo,
    span: Option<SourceSpan>,
    body: Arc<TestNode>,
}

impl TestRoot {
    pub fn new(body: &Arc<TestNode>, span: Option<SourceSpan>) -> Arc<dyn RootNode> {
        Arc::new(TestRoot {
            language: language(),
            span,
            body: body.clone(),
        })
    }
}

impl RootNode for TestRoot {
    fn language(&self) -> &LanguageInfo {
        &self.language
    }

    fn span(&self) -> Option<SourceSpan> {
        self.span.clone()
    }

    fn body(&self) -> NodeRef {
        self.body.clone()
    }
}

/// A body with one tagged statement per line, the usual test shape.
pub fn simple_tree(src_id: u64, lines: &[u32]) -> (Arc<dyn RootNode>, Arc<TestNode>) {
    let src = source(src_id);
    let body = TestNode::new("main", TagSet::from(Tag::ROOT), None);
    for line in lines {
        let stmt = TestNode::new(
            &format!("s{line}"),
            statements(),
            Some(span(&src, *line)),
        );
        body.add_child(&stmt);
    }
    let root_span = SourceSpan::new(src, 0, 10_000, 1, 100);
    (TestRoot::new(&body, Some(root_span)), body)
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct TestFrame {
    pub notes: Vec<String>,
}

#[derive(Debug)]
pub enum ExecError {
    Guest(GuestException),
    Instrument(DispatchError),
}

pub fn run(root: &Arc<dyn RootNode>) -> Result<(), ExecError> {
    let mut frame = TestFrame::default();
    execute(&root.body(), &mut frame)
}

pub fn run_with_frame(root: &Arc<dyn RootNode>, frame: &mut TestFrame) -> Result<(), ExecError> {
    execute(&root.body(), frame)
}

pub fn execute(node: &NodeRef, frame: &mut TestFrame) -> Result<(), ExecError> {
    if let Some(wrapper) = node.as_wrapper() {
        let probe = wrapper.probe();
        let delegate = wrapper.delegate();
        probe.on_enter(frame).map_err(ExecError::Instrument)?;
        match execute_body(&delegate, frame) {
            Ok(()) => {
                probe
                    .on_return_value(frame, &())
                    .map_err(ExecError::Instrument)?;
                Ok(())
            }
            Err(ExecError::Guest(mut exception)) => {
                probe.on_return_exceptional(frame, &mut exception);
                Err(ExecError::Guest(exception))
            }
            Err(other) => Err(other),
        }
    } else {
        execute_body(node, frame)
    }
}

fn execute_body(node: &NodeRef, frame: &mut TestFrame) -> Result<(), ExecError> {
    if let Some(test_node) = node.as_any().downcast_ref::<TestNode>() {
        if test_node.fail_on_execute.load(Ordering::Acquire) {
            return Err(ExecError::Guest(GuestException::new(Box::new(
                test_node.label.clone(),
            ))));
        }
    }
    for child in node.children() {
        execute(&child, frame)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tree inspection helpers
// ---------------------------------------------------------------------------

pub fn find_probe(node: &NodeRef) -> Option<Arc<Probe>> {
    if let Some(wrapper) = node.as_wrapper() {
        return Some(wrapper.probe());
    }
    for child in node.children() {
        if let Some(probe) = find_probe(&child) {
            return Some(probe);
        }
    }
    None
}

pub fn count_wrappers(node: &NodeRef) -> usize {
    let mut count = usize::from(node.as_wrapper().is_some());
    for child in node.children() {
        count += count_wrappers(&child);
    }
    count
}

// ---------------------------------------------------------------------------
// Listener helpers
// ---------------------------------------------------------------------------

/// Shared, drainable record of observed events.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    /// Drains the recorded events.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Records every phase into a shared log.
pub struct Recorder {
    name: &'static str,
    log: EventLog,
}

impl Recorder {
    pub fn new(name: &'static str, log: EventLog) -> Arc<Recorder> {
        Arc::new(Recorder { name, log })
    }
}

impl ExecutionEventListener for Recorder {
    fn on_enter(&self, _ctx: &EventContext, _frame: &mut Frame) -> Result<(), ListenerError> {
        self.log.push(format!("{}.enter", self.name));
        Ok(())
    }

    fn on_return_value(
        &self,
        _ctx: &EventContext,
        _frame: &mut Frame,
        _value: &(dyn Any + Send),
    ) -> Result<(), ListenerError> {
        self.log.push(format!("{}.return", self.name));
        Ok(())
    }

    fn on_return_exceptional(
        &self,
        _ctx: &EventContext,
        _frame: &mut Frame,
        _exception: &GuestException,
    ) -> Result<(), ListenerError> {
        self.log.push(format!("{}.exceptional", self.name));
        Ok(())
    }

    fn on_dispose(&self, _ctx: &EventContext, _frame: &mut Frame) -> Result<(), ListenerError> {
        self.log.push(format!("{}.dispose", self.name));
        Ok(())
    }
}

/// Records into the executing frame instead of a shared log, so concurrent
/// runs keep their sequences apart.
pub struct FrameRecorder {
    name: &'static str,
}

impl FrameRecorder {
    pub fn new(name: &'static str) -> Arc<FrameRecorder> {
        Arc::new(FrameRecorder { name })
    }

    fn note(&self, frame: &mut Frame, phase: &str) {
        if let Some(test_frame) = frame.downcast_mut::<TestFrame>() {
            test_frame.notes.push(format!("{}.{phase}", self.name));
        }
    }
}

impl ExecutionEventListener for FrameRecorder {
    fn on_enter(&self, _ctx: &EventContext, frame: &mut Frame) -> Result<(), ListenerError> {
        self.note(frame, "enter");
        Ok(())
    }

    fn on_return_value(
        &self,
        _ctx: &EventContext,
        frame: &mut Frame,
        _value: &(dyn Any + Send),
    ) -> Result<(), ListenerError> {
        self.note(frame, "return");
        Ok(())
    }
}

/// Fails in a chosen phase, recording the attempt first.
pub struct Saboteur {
    name: &'static str,
    log: EventLog,
    fail_enter: bool,
    fail_exceptional: bool,
}

impl Saboteur {
    pub fn failing_on_enter(name: &'static str, log: EventLog) -> Arc<Saboteur> {
        Arc::new(Saboteur {
            name,
            log,
            fail_enter: true,
            fail_exceptional: false,
        })
    }

    pub fn failing_on_exceptional(name: &'static str, log: EventLog) -> Arc<Saboteur> {
        Arc::new(Saboteur {
            name,
            log,
            fail_enter: false,
            fail_exceptional: true,
        })
    }
}

impl ExecutionEventListener for Saboteur {
    fn on_enter(&self, _ctx: &EventContext, _frame: &mut Frame) -> Result<(), ListenerError> {
        self.log.push(format!("{}.enter", self.name));
        if self.fail_enter {
            return Err("enter sabotage".into());
        }
        Ok(())
    }

    fn on_return_exceptional(
        &self,
        _ctx: &EventContext,
        _frame: &mut Frame,
        _exception: &GuestException,
    ) -> Result<(), ListenerError> {
        self.log.push(format!("{}.exceptional", self.name));
        if self.fail_exceptional {
            return Err("exceptional sabotage".into());
        }
        Ok(())
    }
}

/// Factory producing per-location counting nodes.
pub struct CountingFactory {
    pub created: Arc<AtomicUsize>,
    pub enters: Arc<AtomicUsize>,
}

impl CountingFactory {
    pub fn new() -> Arc<CountingFactory> {
        Arc::new(CountingFactory {
            created: Arc::new(AtomicUsize::new(0)),
            enters: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl EventNodeFactory for CountingFactory {
    fn create(&self, _ctx: &EventContext) -> Result<Arc<dyn ExecutionEventNode>, ListenerError> {
        self.created.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(CounterNode {
            enters: self.enters.clone(),
        }))
    }
}

pub struct CounterNode {
    enters: Arc<AtomicUsize>,
}

impl ExecutionEventNode for CounterNode {
    fn on_enter(&self, _frame: &mut Frame) -> Result<(), ListenerError> {
        self.enters.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Span-load listener recording the loaded line numbers.
pub struct SpanLoadRecorder {
    log: EventLog,
}

impl SpanLoadRecorder {
    pub fn new(log: EventLog) -> Arc<SpanLoadRecorder> {
        Arc::new(SpanLoadRecorder { log })
    }
}

impl LoadSpanListener for SpanLoadRecorder {
    fn on_load(&self, ctx: &EventContext) -> Result<(), ListenerError> {
        let line = ctx.span().map(SourceSpan::line_start).unwrap_or(0);
        self.log.push(format!("load:{line}"));
        Ok(())
    }
}

/// Records source names, usable for both load and execute notifications.
pub struct SourceRecorder {
    verb: &'static str,
    log: EventLog,
}

impl SourceRecorder {
    pub fn new(verb: &'static str, log: EventLog) -> Arc<SourceRecorder> {
        Arc::new(SourceRecorder { verb, log })
    }
}

impl LoadSourceListener for SourceRecorder {
    fn on_load(&self, source: &Source) -> Result<(), ListenerError> {
        self.log.push(format!("{}:{}", self.verb, source.name()));
        Ok(())
    }
}

impl ExecuteSourceListener for SourceRecorder {
    fn on_execute(&self, source: &Source) -> Result<(), ListenerError> {
        self.log.push(format!("{}:{}", self.verb, source.name()));
        Ok(())
    }
}

/// Byte sink collecting stream writes and counting flushes.
pub struct SinkConsumer {
    pub data: Arc<Mutex<Vec<u8>>>,
    pub flushes: Arc<AtomicUsize>,
}

impl SinkConsumer {
    pub fn new() -> Arc<SinkConsumer> {
        Arc::new(SinkConsumer {
            data: Arc::new(Mutex::new(Vec::new())),
            flushes: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl OutputConsumer for SinkConsumer {
    fn write(&self, bytes: &[u8]) {
        self.data.lock().unwrap().extend_from_slice(bytes);
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::AcqRel);
    }
}
