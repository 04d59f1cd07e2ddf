//! File artefacts: the seven-field CSV, hashcat potfiles, and the
//! reconciliation between them.

pub mod csv;
pub mod hashcat;
pub mod update;
