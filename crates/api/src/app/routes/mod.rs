pub mod baskets;
pub mod discovery;
pub mod orders;
pub mod system;
