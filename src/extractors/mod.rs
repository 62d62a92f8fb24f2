//! # Módulo de Extração - Captura de Dados da Página
//!
//! Interpreta o target dos steps ExtractText / ExtractAttribute e decide
//! em qual chave do value cache o valor capturado será gravado.
//!
//! ## Para todos entenderem:
//!
//! Um cenário cria um pedido e a tela mostra o número gerado. O step de
//! extração lê esse número e guarda no cache; um step seguinte digita
//! `${po_number}` e recebe o valor real.
//!
//! ## Formato do target:
//!
//! | Kind | Target | Exemplo |
//! |------|--------|---------|
//! | `extract_text` | `seletores \| CACHE:chave` | `#po-number \| CACHE:po_number` |
//! | `extract_attribute` | `seletores \| atributo \| CACHE:chave` | `#total \| data-value \| CACHE:total` |
//!
//! - `CACHE:` pode aparecer em qualquer posição; sem ele, a chave é gerada
//!   a partir do step (ver [`auto_cache_key`]).
//! - Em `extract_attribute`, o último segmento (fora o `CACHE:`) é o nome
//!   do atributo. Sem esse segmento, o atributo é `value`.

use serde::Serialize;
use tracing::warn;

use crate::errors::StepError;
use crate::executors::elements::split_selectors;

const CACHE_PREFIX: &str = "CACHE:";
const DEFAULT_ATTRIBUTE: &str = "value";

/// De onde o valor é lido.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractSource {
    Text,
    Attribute,
}

impl ExtractSource {
    fn kind_label(&self) -> &'static str {
        match self {
            Self::Text => "extract_text",
            Self::Attribute => "extract_attribute",
        }
    }
}

/// Target de extração já decomposto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractTarget {
    pub selectors: Vec<String>,
    /// Só para `ExtractSource::Attribute`.
    pub attribute: Option<String>,
    /// `None` quando o target não traz `CACHE:`.
    pub cache_key: Option<String>,
}

impl ExtractTarget {
    pub fn parse(target: &str, source: ExtractSource) -> Result<Self, StepError> {
        let mut cache_key = None;
        let mut segments = Vec::new();

        for segment in target.split('|').map(str::trim).filter(|s| !s.is_empty()) {
            match strip_prefix_ignore_case(segment, CACHE_PREFIX) {
                Some(key) if !key.trim().is_empty() => cache_key = Some(key.trim().to_string()),
                Some(_) => warn!(raw = target, "Segmento CACHE: sem chave, usando chave automática"),
                None => segments.push(segment),
            }
        }

        let attribute = match source {
            ExtractSource::Text => None,
            ExtractSource::Attribute if segments.len() >= 2 => segments.pop().map(str::to_string),
            ExtractSource::Attribute => {
                warn!(raw = target, attribute = DEFAULT_ATTRIBUTE, "Target sem atributo, usando o padrão");
                Some(DEFAULT_ATTRIBUTE.to_string())
            }
        };

        let selectors = split_selectors(&segments.join("|"));
        if selectors.is_empty() {
            return Err(StepError::InvalidTarget {
                kind: source.kind_label(),
                reason: format!("nenhum seletor em '{}'", target),
            });
        }

        Ok(Self {
            selectors,
            attribute,
            cache_key,
        })
    }
}

/// Chave usada quando o target não declara `CACHE:`: `step_<ordem>_<nome>`,
/// com espaços do nome trocados por `_`.
pub fn auto_cache_key(order: u32, name: &str) -> String {
    format!("step_{}_{}", order, name.trim().replace(' ', "_"))
}

/// Resumo de uma extração concluída, para log e relatório.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub key: String,
    pub source: ExtractSource,
    pub chars: usize,
}

fn strip_prefix_ignore_case<'a>(segment: &'a str, prefix: &str) -> Option<&'a str> {
    let head = segment.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &segment[prefix.len()..])
}
