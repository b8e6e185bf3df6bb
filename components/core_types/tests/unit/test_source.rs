//! Unit tests for source sections

use core_types::{Node, SourceSection, Value};

#[test]
fn test_source_section_fields() {
    let section = SourceSection::new("model.st", 42, 7);
    assert_eq!(&*section.path, "model.st");
    assert_eq!(section.line, 42);
    assert_eq!(section.column, 7);
}

#[test]
fn test_node_with_source() {
    let node = Node::constant(Value::Int(1)).with_source(SourceSection::new("model.st", 3, 1));
    let section = node.source_section().unwrap();
    assert_eq!(section.line, 3);
}

#[test]
fn test_node_without_source() {
    assert!(Node::constant(Value::Int(1)).source_section().is_none());
}
