//! # Classificador de Tipo de Step
//!
//! Dados legados chegam com o tipo vazio ou inválido. Este módulo infere o
//! [`StepKind`] a partir do nome do step, com fallback para o target.
//!
//! ## Ordem das regras (a primeira que casa vence):
//!
//! | # | Palavras no nome                                   | Kind         |
//! |---|----------------------------------------------------|--------------|
//! | 1 | navigate, page, go to                              | Navigate     |
//! | 2 | click, button, select                              | ElementClick |
//! | 3 | enter, input, type, search (+ `${..}` na descrição)| TextInput    |
//! | 4 | get, capture, extract, workunit, work unit         | ExtractText  |
//! | 5 | wait, pause                                        | Wait         |
//! | 6 | press enter, javascript, script                    | RunScript    |
//! | 7 | target com "://"                                   | Navigate     |
//! | 8 | (nenhuma)                                          | ElementClick |
//!
//! As categorias se sobrepõem ("click search button" casa 2 e 3), então a
//! ordem da tabela não pode mudar.

use crate::context::ValueCache;
use crate::protocol::StepKind;

const NAVIGATE_HINTS: &[&str] = &["navigate", "page", "go to"];
const CLICK_HINTS: &[&str] = &["click", "button", "select"];
const INPUT_HINTS: &[&str] = &["enter", "input", "type", "search"];
const EXTRACT_HINTS: &[&str] = &["get", "capture", "extract", "workunit", "work unit"];
const WAIT_HINTS: &[&str] = &["wait", "pause"];
const SCRIPT_HINTS: &[&str] = &["press enter", "javascript", "script"];

const URL_SCHEME_MARKER: &str = "://";

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Infere o kind canônico de um step. Pura e determinística.
pub fn classify(name: &str, target: &str, description: &str) -> StepKind {
    let name = name.to_lowercase();

    if contains_any(&name, NAVIGATE_HINTS) {
        return StepKind::Navigate;
    }
    if contains_any(&name, CLICK_HINTS) {
        return StepKind::ElementClick;
    }
    if contains_any(&name, INPUT_HINTS) && ValueCache::has_placeholder(description) {
        return StepKind::TextInput;
    }
    if contains_any(&name, EXTRACT_HINTS) {
        return StepKind::ExtractText;
    }
    if contains_any(&name, WAIT_HINTS) {
        return StepKind::Wait;
    }
    if contains_any(&name, SCRIPT_HINTS) {
        return StepKind::RunScript;
    }
    if target.contains(URL_SCHEME_MARKER) {
        return StepKind::Navigate;
    }
    StepKind::ElementClick
}

/// Retorna o kind persistido, ou classifica quando ele é `Unknown`.
pub fn resolve(kind: StepKind, name: &str, target: &str, description: &str) -> StepKind {
    match kind {
        StepKind::Unknown => classify(name, target, description),
        known => known,
    }
}
