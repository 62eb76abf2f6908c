pub mod base;
pub mod http;
pub mod loader;
pub mod medium_adapter;
pub mod memory_adapter;
pub mod registry;
pub mod webhook_adapter;
pub mod wordpress_adapter;

pub use base::AdapterBase;
pub use loader::{AdapterLoader, AdapterType};
pub use medium_adapter::MediumAdapter;
pub use memory_adapter::MemoryAdapter;
pub use registry::AdapterRegistry;
pub use webhook_adapter::WebhookAdapter;
pub use wordpress_adapter::WordPressAdapter;
