pub mod assessment;
pub mod auth;
pub mod cloud;
pub mod document;
pub mod editor;
pub mod group;
pub mod schedule;
pub mod student;
pub mod teacher;
