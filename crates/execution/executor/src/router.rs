// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{
    context::{MsgResult, TxContext},
    error::ExecError,
};
use pexec_primitives::Msg;
use std::collections::HashMap;

pub trait MsgHandler: Send + Sync {
    fn handle(
        &self, ctx: &mut TxContext, msg: &Msg,
    ) -> Result<MsgResult, ExecError>;
}

impl<F> MsgHandler for F
where F: Fn(&mut TxContext, &Msg) -> Result<MsgResult, ExecError> + Send + Sync
{
    fn handle(
        &self, ctx: &mut TxContext, msg: &Msg,
    ) -> Result<MsgResult, ExecError> {
        self(ctx, msg)
    }
}

/// Dispatches messages to handlers by their route.
#[derive(Default)]
pub struct MsgRouter {
    routes: HashMap<String, Box<dyn MsgHandler>>,
}

impl MsgRouter {
    pub fn new() -> Self { Self::default() }

    /// Registers `handler` for `route`. Registering a route twice or a
    /// route that is not alphanumeric is a wiring bug and panics.
    pub fn add_route(
        mut self, route: &str, handler: impl MsgHandler + 'static,
    ) -> Self {
        let valid = !route.is_empty()
            && route.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            panic!("route must be alphanumeric, got {:?}", route);
        }
        if self.routes.contains_key(route) {
            panic!("route {} has already been initialized", route);
        }
        self.routes.insert(route.to_string(), Box::new(handler));
        self
    }

    pub fn has_route(&self, route: &str) -> bool {
        self.routes.contains_key(route)
    }

    pub fn route(
        &self, ctx: &mut TxContext, msg: &Msg,
    ) -> Result<MsgResult, ExecError> {
        match self.routes.get(&msg.route) {
            Some(handler) => handler.handle(ctx, msg),
            None => Err(ExecError::UnknownRoute(msg.route.clone())),
        }
    }
}
