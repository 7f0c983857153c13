pub mod capture_management;
pub use capture_management::CaptureSupervisor;

pub mod configuration;

pub mod controller;
pub use controller::Controller;

pub mod data_capture;

pub mod device;

pub mod error_handling;

pub mod storage;
