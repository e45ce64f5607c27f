pub mod db_cleanup_system;
