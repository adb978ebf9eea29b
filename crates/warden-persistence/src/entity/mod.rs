//! SeaORM entity definitions

pub mod lock_indices;
pub mod locks;

pub mod prelude {
    pub use super::lock_indices::Entity as LockIndices;
    pub use super::locks::Entity as Locks;
}
