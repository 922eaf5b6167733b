pub mod backup;
pub mod calc;
pub mod core;
pub mod evaluations;
pub mod import_legacy;
pub mod settings;
pub mod subjects;
