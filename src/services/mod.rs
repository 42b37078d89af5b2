pub mod media_inventory;

pub use media_inventory::MediaInventory;
