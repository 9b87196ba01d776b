/// Update producers feeding the hub
///
/// Real deployments drive the hub from their own status pollers and
/// operation executors through `Hub::broadcast_status` and
/// `Hub::broadcast_operation`. The sources here are built in.
pub mod demo;
