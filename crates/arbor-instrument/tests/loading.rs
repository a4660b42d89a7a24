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

//! Load-time observation: span-load listeners with optional replay of
//! already-loaded trees, and once-per-identity source load/execute
//! notifications.

mod common;

use arbor_core::Filter;
use arbor_instrument::{HandlerSettings, InstrumentError, InstrumentationHandler};

use common::*;

fn stmt_filter() -> Filter {
    Filter::builder().tag_is(statements()).build().unwrap()
}

fn toy_sources() -> Filter {
    Filter::builder()
        .mime_type_is(&["application/x-toy"])
        .build()
        .unwrap()
}

#[test]
fn span_load_listener_fires_per_matching_location() {
    let handler = InstrumentationHandler::new(HandlerSettings::default());
    let tool = handler.instrumenter_for_tool("coverage");
    let log = EventLog::default();
    let _b = tool
        .attach_load_span(stmt_filter(), SpanLoadRecorder::new(log.clone()), false)
        .unwrap();

    let (root, _body) = simple_tree(1, &[3, 7]);
    handler.on_load(&root).unwrap();
    assert_eq!(log.take(), vec!["load:3", "load:7"]);

    // Loading fires once per tree; execution does not repeat it.
    handler.on_first_execution(&root).unwrap();
    run(&root).unwrap();
    assert!(log.take().is_empty());
}

#[test]
fn span_load_replays_existing_trees_on_request() {
    let handler = InstrumentationHandler::new(HandlerSettings::default());
    let (r1, _) = simple_tree(1, &[1]);
    let (r2, _) = simple_tree(2, &[2]);
    handler.on_load(&r1).unwrap();
    handler.on_load(&r2).unwrap();

    let tool = handler.instrumenter_for_tool("coverage");
    let replayed = EventLog::default();
    let _b1 = tool
        .attach_load_span(stmt_filter(), SpanLoadRecorder::new(replayed.clone()), true)
        .unwrap();
    assert_eq!(replayed.take(), vec!["load:1", "load:2"]);

    let silent = EventLog::default();
    let _b2 = tool
        .attach_load_span(stmt_filter(), SpanLoadRecorder::new(silent.clone()), false)
        .unwrap();
    assert!(silent.take().is_empty());

    // Both listeners observe trees loaded from now on.
    let (r3, _) = simple_tree(3, &[5]);
    handler.on_load(&r3).unwrap();
    assert_eq!(replayed.take(), vec!["load:5"]);
    assert_eq!(silent.take(), vec!["load:5"]);
}

#[test]
fn source_load_fires_once_per_source_identity() {
    let handler = InstrumentationHandler::new(HandlerSettings::default());
    let tool = handler.instrumenter_for_tool("sources");
    let log = EventLog::default();
    let _b = tool
        .attach_load_source(toy_sources(), SourceRecorder::new("load", log.clone()), false)
        .unwrap();

    let (r1, _) = simple_tree(1, &[1]);
    let (r1_again, _) = simple_tree(1, &[9]);
    let (r2, _) = simple_tree(2, &[1]);
    handler.on_load(&r1).unwrap();
    handler.on_load(&r1_again).unwrap();
    handler.on_load(&r2).unwrap();

    assert_eq!(log.take(), vec!["load:script-1.toy", "load:script-2.toy"]);
}

#[test]
fn source_load_replays_known_sources_in_first_seen_order() {
    let handler = InstrumentationHandler::new(HandlerSettings::default());
    let (r1, _) = simple_tree(1, &[1]);
    let (r2, _) = simple_tree(2, &[1]);
    handler.on_load(&r1).unwrap();
    handler.on_load(&r2).unwrap();

    // Attaching activates source tracking and harvests the known trees.
    let tool = handler.instrumenter_for_tool("sources");
    let log = EventLog::default();
    let _b = tool
        .attach_load_source(toy_sources(), SourceRecorder::new("load", log.clone()), true)
        .unwrap();
    assert_eq!(log.take(), vec!["load:script-1.toy", "load:script-2.toy"]);
}

#[test]
fn source_filters_gate_notifications() {
    let handler = InstrumentationHandler::new(HandlerSettings::default());
    let tool = handler.instrumenter_for_tool("sources");
    let log = EventLog::default();
    let only_two = Filter::builder()
        .source_is([source(2)])
        .build()
        .unwrap();
    let _b = tool
        .attach_load_source(only_two, SourceRecorder::new("load", log.clone()), false)
        .unwrap();

    let (r1, _) = simple_tree(1, &[1]);
    let (r2, _) = simple_tree(2, &[1]);
    handler.on_load(&r1).unwrap();
    handler.on_load(&r2).unwrap();
    assert_eq!(log.take(), vec!["load:script-2.toy"]);
}

#[test]
fn execute_source_fires_on_first_execution_only() {
    let handler = InstrumentationHandler::new(HandlerSettings::default());
    let tool = handler.instrumenter_for_tool("sources");
    let log = EventLog::default();
    let _b = tool
        .attach_execute_source(toy_sources(), SourceRecorder::new("exec", log.clone()), false)
        .unwrap();

    let (r1, _) = simple_tree(1, &[1]);
    let (r1_again, _) = simple_tree(1, &[2]);
    handler.on_load(&r1).unwrap();
    handler.on_load(&r1_again).unwrap();
    assert!(log.take().is_empty());

    handler.on_first_execution(&r1).unwrap();
    assert_eq!(log.take(), vec!["exec:script-1.toy"]);

    // A second tree of the same source adds nothing.
    handler.on_first_execution(&r1_again).unwrap();
    assert!(log.take().is_empty());
}

#[test]
fn source_bindings_reject_non_source_filters() {
    let handler = InstrumentationHandler::new(HandlerSettings::default());
    let tool = handler.instrumenter_for_tool("sources");
    let log = EventLog::default();

    let result = tool.attach_load_source(
        stmt_filter(),
        SourceRecorder::new("load", log.clone()),
        false,
    );
    assert!(matches!(
        result,
        Err(InstrumentError::SourceOnlyFilterRequired)
    ));

    let result = tool.attach_execute_source(
        stmt_filter(),
        SourceRecorder::new("exec", log),
        false,
    );
    assert!(matches!(
        result,
        Err(InstrumentError::SourceOnlyFilterRequired)
    ));
}
