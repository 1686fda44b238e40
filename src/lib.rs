pub mod config;
pub mod deviceinfo;
pub mod device_worker;
pub mod double_mapper;
pub mod event;
pub mod hotplug;
pub mod meta_mapper;
pub mod pipeline;
pub mod single_mapper;
pub mod supervisor;
