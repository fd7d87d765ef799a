pub mod db;
pub mod locations;
