pub mod activity_queries;
