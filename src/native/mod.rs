/// Native module contains implementations of core traits backed by real
/// processes on the host, one short-lived `node` worker per evaluation.
pub mod node;
