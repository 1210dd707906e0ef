pub mod bootstrap;
pub mod planner_service;
