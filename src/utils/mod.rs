pub mod paced_scheduler;
