//! Light dimmer: click events and `?brightness=` live patches.

use liveframe_core::{
    html, Capabilities, Component, ComponentResult, Html, MountParams, Params, SessionData, Socket,
};
use serde_json::Value;
use url::Url;

const STEP: u8 = 10;
const MAX: u8 = 100;

pub struct LightComponent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Light {
    pub brightness: u8,
}

fn parse_brightness(value: Option<&Value>) -> Option<u8> {
    let brightness = match value? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    Some(brightness.min(u64::from(MAX)) as u8)
}

impl Component for LightComponent {
    type Context = Light;
    type Info = ();

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with_events().with_live_patch()
    }

    fn mount(&self, params: &MountParams, _: &SessionData, _: &Socket<()>) -> ComponentResult<Light> {
        Ok(Light {
            brightness: parse_brightness(params.get("brightness")).unwrap_or(STEP),
        })
    }

    fn render(&self, light: &Light) -> Html {
        html!(
            "<h1>Front Porch Light</h1><div id=\"light\"><div class=\"meter\"><span style=\"width: {}%\">{}%</span></div><button phx-click=\"off\">Off</button><button phx-click=\"down\">Down</button><button phx-click=\"up\">Up</button><button phx-click=\"on\">On</button></div>",
            light.brightness,
            light.brightness
        )
    }

    fn handle_event(
        &self,
        event: &str,
        _: &Params,
        light: Light,
        _: &Socket<()>,
    ) -> ComponentResult<Light> {
        let brightness = match event {
            "on" => MAX,
            "off" => 0,
            "up" => light.brightness.saturating_add(STEP).min(MAX),
            "down" => light.brightness.saturating_sub(STEP),
            _ => light.brightness,
        };
        Ok(Light { brightness })
    }

    fn handle_live_patch(
        &self,
        params: &Params,
        _: &Url,
        light: Light,
        _: &Socket<()>,
    ) -> ComponentResult<Light> {
        Ok(parse_brightness(params.get("brightness"))
            .map(|brightness| Light { brightness })
            .unwrap_or(light))
    }
}
