// Handshake integration tests
