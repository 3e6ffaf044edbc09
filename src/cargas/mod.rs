pub mod carga_controller;
pub mod carga_registry;
pub mod carga_repository;
pub mod carga_service;
pub mod carga_store;
pub mod error;
pub mod model;
