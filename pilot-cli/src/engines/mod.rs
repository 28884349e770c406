mod fake;
mod system;

pub use fake::FakeManager;
pub use system::SystemRunner;
