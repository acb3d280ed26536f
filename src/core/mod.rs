// Core module - Sessions, port discovery and device traffic
pub mod catalog;
pub mod communication;
pub mod session;
