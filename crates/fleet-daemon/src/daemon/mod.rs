pub mod event_loop;
pub mod shutdown;
pub mod socket;

pub use event_loop::run;
pub use shutdown::graceful_shutdown;
pub use socket::{
    HostRequest, HostResponse, SocketServerHandle, apply_host_request, start_socket_server,
};
