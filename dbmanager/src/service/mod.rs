//! Service layer

pub mod db;
