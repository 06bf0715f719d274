pub mod ad;
pub mod subscription;

// Re-exports for convenience
pub use ad::*;
pub use subscription::*;
