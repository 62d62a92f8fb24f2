//! # Resolução de Elementos
//!
//! Operações compostas sobre o [`Driver`]: espera limitada por presença
//! (ou presença + clicável) e listas de seletores alternativos.
//!
//! ## Lista de seletores
//!
//! Um target pode trazer vários seletores candidatos. Eles são tentados
//! na ordem escrita, cada um com seu próprio prazo, e o primeiro que
//! resolve vence.
//!
//! - `|` sempre separa candidatos.
//! - Sem `|`, a vírgula separa candidatos apenas para seletores CSS.
//!   XPath usa vírgula em funções (`contains(@id,'x')`), então um XPath
//!   sem `|` é sempre um único candidato.

use tracing::{debug, warn};

use crate::driver::{Driver, DriverError, DriverResult, ElementHandle, Locator};
use crate::errors::StepError;
use crate::polling::PollPolicy;

/// Quebra um target em seletores candidatos, sem vazios.
pub fn split_selectors(target: &str) -> Vec<String> {
    let target = target.trim();
    let pieces: Vec<&str> = if target.contains('|') {
        target.split('|').collect()
    } else if matches!(Locator::parse(target), Locator::XPath(_)) {
        vec![target]
    } else {
        target.split(',').collect()
    };

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Espera `selector` aparecer (e ficar clicável, se pedido) dentro do prazo.
///
/// `Ok(None)` significa prazo esgotado. Elementos que somem entre a busca
/// e a checagem contam como "ainda não".
pub async fn wait_for(
    driver: &dyn Driver,
    selector: &str,
    policy: PollPolicy,
    require_clickable: bool,
) -> DriverResult<Option<ElementHandle>> {
    let locator = Locator::parse(selector);
    let locator = &locator;

    policy
        .until(selector, move || async move {
            let element = match driver.find(locator).await {
                Ok(Some(element)) => element,
                Ok(None) | Err(DriverError::NoSuchElement(_)) => return Ok(None),
                Err(e) => return Err(e),
            };

            if !require_clickable {
                return Ok(Some(element));
            }

            match driver.is_clickable(&element).await {
                Ok(true) => Ok(Some(element)),
                Ok(false) | Err(DriverError::NoSuchElement(_)) | Err(DriverError::NotInteractable(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
}

/// Clica no primeiro candidato clicável. Com `right_click`, seleciona com
/// um clique simples e depois abre o menu de contexto.
///
/// Devolve o seletor que funcionou.
pub async fn find_and_click(
    driver: &dyn Driver,
    candidates: &[String],
    policy: PollPolicy,
    right_click: bool,
) -> Result<String, StepError> {
    for selector in candidates {
        let element = match wait_for(driver, selector, policy, true).await {
            Ok(Some(element)) => element,
            Ok(None) => {
                debug!(%selector, "Candidato não ficou clicável no prazo");
                continue;
            }
            Err(e) => {
                warn!(%selector, error = %e, "Falha ao resolver candidato");
                continue;
            }
        };

        let clicked = async {
            driver.click(&element).await?;
            if right_click {
                driver.context_click(&element).await?;
            }
            Ok::<(), DriverError>(())
        }
        .await;

        match clicked {
            Ok(()) => return Ok(selector.clone()),
            Err(e) => warn!(%selector, error = %e, "Clique falhou, tentando próximo candidato"),
        }
    }

    Err(StepError::SelectorExhausted {
        candidates: candidates.to_vec(),
    })
}

/// Texto visível do primeiro candidato presente.
pub async fn find_text(driver: &dyn Driver, candidates: &[String], policy: PollPolicy) -> Result<String, StepError> {
    for selector in candidates {
        match wait_for(driver, selector, policy, false).await {
            Ok(Some(element)) => match driver.text(&element).await {
                Ok(text) => return Ok(text),
                Err(e) => warn!(%selector, error = %e, "Falha ao ler texto"),
            },
            Ok(None) => debug!(%selector, "Candidato ausente"),
            Err(e) => warn!(%selector, error = %e, "Falha ao resolver candidato"),
        }
    }

    Err(StepError::SelectorExhausted {
        candidates: candidates.to_vec(),
    })
}

/// Valor de `attribute` no primeiro candidato presente que o tenha.
///
/// Se algum elemento foi encontrado mas nenhum tinha o atributo, o erro é
/// `AttributeMissing` em vez de `SelectorExhausted`.
pub async fn find_attribute(
    driver: &dyn Driver,
    candidates: &[String],
    attribute: &str,
    policy: PollPolicy,
) -> Result<String, StepError> {
    let mut found_without_attribute: Option<&String> = None;

    for selector in candidates {
        match wait_for(driver, selector, policy, false).await {
            Ok(Some(element)) => match driver.attribute(&element, attribute).await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => found_without_attribute = Some(selector),
                Err(e) => warn!(%selector, attribute, error = %e, "Falha ao ler atributo"),
            },
            Ok(None) => debug!(%selector, "Candidato ausente"),
            Err(e) => warn!(%selector, error = %e, "Falha ao resolver candidato"),
        }
    }

    match found_without_attribute {
        Some(selector) => Err(StepError::AttributeMissing {
            selector: selector.clone(),
            attribute: attribute.to_string(),
        }),
        None => Err(StepError::SelectorExhausted {
            candidates: candidates.to_vec(),
        }),
    }
}
