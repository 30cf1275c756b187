pub mod sessions;
pub mod violations;
