pub mod cleanup_service;
