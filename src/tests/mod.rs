// Tests module
// Support: loopback peers, recording listener, test dialers
// Networking: directory, discovery, pool and sessions wired together

pub mod support;
