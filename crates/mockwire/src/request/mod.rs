//! Request-side matching: the parsed request, field matchers over its
//! attributes and the composite matcher a mapping carries.

mod fields;
mod matcher;
mod message;
mod model;

pub use fields::{
    BodyMatcher, ClientIpMatcher, CookieMatcher, HeaderMatcher, KeyedMatcher, MethodMatcher,
    ParamMatcher, PathMatcher, RequestFieldMatcher, UrlMatcher, ValueMatchers,
};
pub use matcher::RequestMatcher;
pub use message::{parse_cookies, parse_query_string, BodyData, RequestMessage};
pub use model::{FieldModel, KeyedModel, RequestModel};
