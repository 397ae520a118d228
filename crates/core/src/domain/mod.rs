pub mod money;
pub mod product;
pub mod slots;
