//! Data-driven entity templates.
//!
//! Pure data structures deserialized from RON. A [`UnitCatalog`] bundles
//! every template, validates cross references on load and builds live
//! entities.
//!
//! **Note:** This module contains no IO. Callers read files and hand the
//! contents to [`UnitCatalog::from_ron_str`].

mod catalog;
mod equipment_data;
mod unit_data;
mod weapon_data;

pub use catalog::UnitCatalog;
pub use equipment_data::{AbilityData, AbilityKindData, EquipmentData};
pub use unit_data::{StanceData, UnitData};
pub use weapon_data::{WeaponData, WeaponKindData};
