pub mod circuit_breaker;
pub mod platform_adapter;
pub mod rate_limiter;

pub use circuit_breaker::CircuitBreakerRegistry;
pub use platform_adapter::NullAdapter;
pub use platform_adapter::PlatformAdapter;
pub use rate_limiter::RateLimiter;
