//! Type and member metadata: classification, wire bindings and the registration table.

pub mod descriptor;
pub mod member;
pub mod registry;

pub use descriptor::{TypeCategory, TypeCode, TypeDescriptor, TypeRef};
pub use member::{MemberBinding, MemberFlags, MemberKind, MemberSpec};
pub use registry::{ConstructorKind, TypeKind, TypeRegistration, TypeRegistry};
