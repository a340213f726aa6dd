//! Store search: a form submit that renders a loader, then the deferred
//! results.

use liveframe_core::template::{form_for, FormOptions};
use liveframe_core::{
    html, Capabilities, Component, ComponentResult, Html, MountParams, Params, SessionData, Socket,
};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Delay before the search runs, so the loader is visible.
const SEARCH_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    pub name: &'static str,
    pub street: &'static str,
    pub phone_number: &'static str,
    pub city: &'static str,
    pub zip: &'static str,
    pub open: bool,
}

static STORES: &[Store] = &[
    Store {
        name: "Downtown Helena",
        street: "312 Montana Avenue",
        phone_number: "406-555-0100",
        city: "Helena, MT",
        zip: "59602",
        open: true,
    },
    Store {
        name: "East Helena",
        street: "227 Miner's Lane",
        phone_number: "406-555-0120",
        city: "Helena, MT",
        zip: "59602",
        open: false,
    },
    Store {
        name: "Westside Helena",
        street: "734 Lake Loop",
        phone_number: "406-555-0130",
        city: "Helena, MT",
        zip: "59602",
        open: true,
    },
    Store {
        name: "Denver Stapleton",
        street: "821 Broadway Drive",
        phone_number: "303-555-0140",
        city: "Denver, CO",
        zip: "80216",
        open: true,
    },
    Store {
        name: "Denver Boulder",
        street: "143 Blake Street",
        phone_number: "303-555-0150",
        city: "Denver, CO",
        zip: "80216",
        open: false,
    },
];

/// Stores with an exact zip match.
pub fn search_by_zip(zip: &str) -> Vec<Store> {
    STORES.iter().filter(|store| store.zip == zip).cloned().collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchContext {
    pub zip: String,
    pub stores: Vec<Store>,
    pub loading: bool,
}

#[derive(Debug)]
pub enum SearchInfo {
    RunZipSearch { zip: String },
}

pub struct SearchComponent;

impl SearchComponent {
    fn render_store(store: &Store) -> Html {
        let status = if store.open {
            html!("<span class=\"open\">Open</span>")
        } else {
            html!("<span class=\"closed\">Closed</span>")
        };
        html!(
            "<li><div class=\"name\">{}</div><div class=\"status\">{}</div><div class=\"street\">{}</div><div class=\"phone_number\">{}</div></li>",
            store.name,
            status,
            store.street,
            store.phone_number
        )
    }
}

impl Component for SearchComponent {
    type Context = SearchContext;
    type Info = SearchInfo;

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with_events().with_info()
    }

    fn mount(
        &self,
        _: &MountParams,
        _: &SessionData,
        _: &Socket<SearchInfo>,
    ) -> ComponentResult<SearchContext> {
        Ok(SearchContext::default())
    }

    fn render(&self, context: &SearchContext) -> Html {
        let stores: Vec<Html> = context.stores.iter().map(Self::render_store).collect();
        html!(
            "<h1>Find a Store</h1><div id=\"search\">{}<input type=\"text\" name=\"zip\" value=\"{}\" placeholder=\"Zip Code\" autofocus autocomplete=\"off\" {}/><button type=\"submit\">Search</button></form>{}<div class=\"stores\"><ul>{}</ul></div></div>",
            form_for("#", &FormOptions::new().phx_submit("zip-search")),
            &context.zip,
            context.loading.then_some("readonly"),
            context
                .loading
                .then(|| html!("<div class=\"loader\">Loading...</div>")),
            stores
        )
    }

    fn handle_event(
        &self,
        event: &str,
        params: &Params,
        context: SearchContext,
        socket: &Socket<SearchInfo>,
    ) -> ComponentResult<SearchContext> {
        if event != "zip-search" {
            return Ok(context);
        }
        let zip = params
            .get("zip")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        socket.send_info_after(SEARCH_DELAY, SearchInfo::RunZipSearch { zip: zip.clone() });
        Ok(SearchContext {
            zip,
            stores: Vec::new(),
            loading: true,
        })
    }

    fn handle_info(
        &self,
        info: SearchInfo,
        _: SearchContext,
        _: &Socket<SearchInfo>,
    ) -> ComponentResult<SearchContext> {
        let SearchInfo::RunZipSearch { zip } = info;
        let stores = search_by_zip(&zip);
        debug!(zip = %zip, found = stores.len(), "Zip search");
        Ok(SearchContext {
            zip,
            stores,
            loading: false,
        })
    }
}
