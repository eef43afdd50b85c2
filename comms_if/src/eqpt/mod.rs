//! # Equipment Interface
//!
//! This module defines the interface structures which are passed to and from equipment.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod cam;
pub mod mech;
