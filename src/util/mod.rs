pub mod cp1252;
