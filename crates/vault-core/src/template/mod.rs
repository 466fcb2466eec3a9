//! Persistent registry of API templates

mod registry;

pub use registry::TemplateRegistry;
pub(crate) use registry::template_key;
