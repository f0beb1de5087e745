pub mod edge;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod id;
pub mod node;
pub mod types;

// Re-export commonly used types
pub use edge::{AccessMode, AstRole, Edge, EdgeKind, EdgeProperties, Property, PropertyValue};
pub use error::CoreError;
pub use graph::CodeGraph;
pub use hierarchy::RecordHierarchy;
pub use id::{EdgeId, NodeId, NodeUid};
pub use node::{Node, NodeKind, RecordKind, SourceLocation, TemplateArgs, TypeState};
pub use types::{ObjectType, PointerOrigin, PrimitiveKind, PrimitiveType, Type};
