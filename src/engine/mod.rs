pub mod assignment;
pub mod transitions;
