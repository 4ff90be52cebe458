pub mod executor;
pub mod study_dir;
