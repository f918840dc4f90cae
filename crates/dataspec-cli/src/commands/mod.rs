pub mod alias;
pub mod analyze;
pub mod check_compat;
pub mod create;
pub mod lock;
pub mod validate;
