//! Deterministic Simulation Testing (DST) infrastructure.
//!
//! This module provides tools for testing the tree with:
//! - An in-memory object store with fault injection
//! - Reproducible random operation sequences
//! - A model map and structure checks after each step
//!
//! # Design Principles
//!
//! 1. All I/O goes through the `ObjectStore` trait and can be simulated
//! 2. All randomness is seeded for reproducibility
//! 3. Faults can be injected at any store call
//! 4. Given the same seed, execution is identical
//!
//! # Usage
//!
//! ```ignore
//! use simulation::{FaultConfig, Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::new(12345) // seed
//!     .with_fault_config(FaultConfig::low_faults());
//!
//! let mut sim = Simulator::new(config);
//! let result = sim.run(1000); // Run 1000 operations
//!
//! assert!(result.invariant_violations.is_empty());
//! ```

mod op_gen;

pub use invariants::{InvariantChecker, InvariantViolation, Model};
pub use op_gen::{Op, OpGenConfig, OpGenerator};
pub use simulator::{SimulationResult, Simulator, SimulatorConfig};
pub use storage::{FaultConfig, SimulatedStore, SimulatedStoreStats};
