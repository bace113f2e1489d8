pub mod correlator;
pub mod record;
pub mod scanner;
pub mod transport;
pub mod wire;
