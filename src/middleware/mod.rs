/*
 * Responsibility
 * - Public interface of the middleware layer
 */
pub mod http;
