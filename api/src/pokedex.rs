use axum::{
    extract::{Query, State},
    Json,
};
use quibble_shared::{ApiResponse, Page, Pokemon, PokemonStats};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::{error::ApiError, pagination::PageParams, AppState};

const TYPES_CACHE_TTL: Duration = Duration::from_secs(3600);

/// The upstream type list barely ever changes; one fetch per TTL window.
#[derive(Debug, Clone)]
pub struct CachedTypes {
    pub names: Vec<String>,
    pub fetched_at: Instant,
}

// ── Upstream payloads ──

#[derive(Debug, Deserialize)]
struct ListResponse {
    count: i64,
    results: Vec<NamedRef>,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TypeDetailResponse {
    pokemon: Vec<TypeEntry>,
}

#[derive(Debug, Deserialize)]
struct TypeEntry {
    pokemon: NamedRef,
}

#[derive(Debug, Deserialize)]
struct TypeListResponse {
    results: Vec<NamedRef>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    id: i64,
    stats: Vec<StatEntry>,
    types: Vec<TypeSlot>,
    sprites: Sprites,
}

#[derive(Debug, Deserialize)]
struct StatEntry {
    base_stat: i64,
}

#[derive(Debug, Deserialize)]
struct TypeSlot {
    r#type: NamedSlot,
}

#[derive(Debug, Deserialize)]
struct NamedSlot {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Sprites {
    front_default: Option<String>,
    other: Option<OtherSprites>,
}

#[derive(Debug, Deserialize)]
struct OtherSprites {
    #[serde(rename = "official-artwork")]
    official_artwork: Option<Artwork>,
}

#[derive(Debug, Deserialize)]
struct Artwork {
    front_default: Option<String>,
}

// ── Mapping ──

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// Upstream orders stats hp, attack, defense, sp-atk, sp-def, speed.
fn extract_stats(detail: &DetailResponse) -> PokemonStats {
    let stat = |i: usize| detail.stats.get(i).map(|s| s.base_stat).unwrap_or(0);
    PokemonStats {
        hp: stat(0),
        attack: stat(1),
        defense: stat(2),
        sp_atk: stat(3),
        sp_def: stat(4),
        speed: stat(5),
    }
}

// Official artwork when present, plain sprite as the fallback.
fn extract_image(detail: &DetailResponse) -> String {
    detail
        .sprites
        .other
        .as_ref()
        .and_then(|o| o.official_artwork.as_ref())
        .and_then(|a| a.front_default.clone())
        .or_else(|| detail.sprites.front_default.clone())
        .unwrap_or_default()
}

fn to_pokemon(name: &str, detail: &DetailResponse) -> Pokemon {
    Pokemon {
        id: detail.id,
        name: capitalize(name),
        image: extract_image(detail),
        types: detail.types.iter().map(|t| t.r#type.name.clone()).collect(),
        stats: extract_stats(detail),
    }
}

fn page_slice<T>(items: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

// ── Handlers ──

#[derive(Deserialize)]
pub struct PokedexParams {
    page: Option<String>,
    #[serde(rename = "pageSize")]
    page_size: Option<String>,
    r#type: Option<String>,
}

/// GET /api/pokedex/pokemon?page=1&pageSize=20&type=fire
///
/// Without `type` the upstream list endpoint is windowed via its own
/// limit/offset parameters; with `type` the member list is fetched once
/// and windowed locally. Detail records for the page's entries are
/// fetched as concurrently spawned tasks and joined before the page is
/// assembled; an entry whose detail fetch fails is dropped from the page
/// rather than failing the whole request.
pub async fn list_pokemon(
    State(state): State<AppState>,
    Query(params): Query<PokedexParams>,
) -> Result<Json<ApiResponse<Page<Pokemon>>>, ApiError> {
    let query = PageParams {
        page: params.page,
        page_size: params.page_size,
        query: None,
        sort: None,
    }
    .validate()?;

    let (entries, total) = match params.r#type.as_deref() {
        None => {
            let url = format!(
                "{}/pokemon?limit={}&offset={}",
                state.pokeapi_url,
                query.page_size,
                query.offset()
            );
            let list: ListResponse = state
                .http
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            (list.results, list.count)
        }
        Some(type_name) => {
            let url = format!("{}/type/{}", state.pokeapi_url, type_name);
            let detail: TypeDetailResponse = state
                .http
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let members: Vec<NamedRef> = detail.pokemon.into_iter().map(|e| e.pokemon).collect();
            let total = members.len() as i64;
            (
                page_slice(members, query.offset(), query.page_size),
                total,
            )
        }
    };

    // Issue every detail fetch up front, then join before assembling the
    // page so the output order matches the upstream listing order.
    let mut handles = Vec::with_capacity(entries.len());
    for NamedRef { name, url } in entries {
        let client = state.http.clone();
        handles.push(tokio::spawn(async move {
            let detail: DetailResponse = client
                .get(url)
                .send()
                .await
                .ok()?
                .error_for_status()
                .ok()?
                .json()
                .await
                .ok()?;
            Some(to_pokemon(&name, &detail))
        }));
    }

    let mut items = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Some(pokemon) = handle.await? {
            items.push(pokemon);
        } else {
            tracing::warn!("dropping pokemon entry after failed detail fetch");
        }
    }

    Ok(Json(ApiResponse::ok(Page {
        items,
        is_next: query.is_next(total),
    })))
}

/// GET /api/pokedex/types — sorted type names, cached for an hour
pub async fn list_types(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    {
        let cache = state.types_cache.read().await;
        if let Some(ref cached) = *cache {
            if cached.fetched_at.elapsed() < TYPES_CACHE_TTL {
                return Ok(Json(ApiResponse::ok(cached.names.clone())));
            }
        }
    }

    let url = format!("{}/type?limit=100", state.pokeapi_url);
    let list: TypeListResponse = state
        .http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let mut names: Vec<String> = list.results.into_iter().map(|r| r.name).collect();
    names.sort();

    {
        let mut cache = state.types_cache.write().await;
        *cache = Some(CachedTypes {
            names: names.clone(),
            fetched_at: Instant::now(),
        });
    }

    Ok(Json(ApiResponse::ok(names)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_JSON: &str = r#"{
        "id": 25,
        "stats": [
            {"base_stat": 35}, {"base_stat": 55}, {"base_stat": 40},
            {"base_stat": 50}, {"base_stat": 50}, {"base_stat": 90}
        ],
        "types": [
            {"type": {"name": "electric"}}
        ],
        "sprites": {
            "front_default": "sprite.png",
            "other": {"official-artwork": {"front_default": "artwork.png"}}
        }
    }"#;

    #[test]
    fn detail_maps_to_pokemon() {
        let detail: DetailResponse = serde_json::from_str(DETAIL_JSON).unwrap();
        let pokemon = to_pokemon("pikachu", &detail);
        assert_eq!(pokemon.id, 25);
        assert_eq!(pokemon.name, "Pikachu");
        assert_eq!(pokemon.image, "artwork.png");
        assert_eq!(pokemon.types, vec!["electric"]);
        assert_eq!(pokemon.stats.hp, 35);
        assert_eq!(pokemon.stats.speed, 90);
    }

    #[test]
    fn image_falls_back_to_plain_sprite() {
        let detail: DetailResponse = serde_json::from_str(
            r#"{"id": 1, "stats": [], "types": [], "sprites": {"front_default": "sprite.png"}}"#,
        )
        .unwrap();
        assert_eq!(extract_image(&detail), "sprite.png");
        // Missing stat slots read as zero rather than panicking.
        assert_eq!(extract_stats(&detail).attack, 0);
    }

    #[test]
    fn capitalize_first_letter_only() {
        assert_eq!(capitalize("bulbasaur"), "Bulbasaur");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("mr-mime"), "Mr-mime");
    }

    #[test]
    fn page_slice_windows_like_the_query() {
        let items: Vec<i64> = (1..=5).collect();
        assert_eq!(page_slice(items.clone(), 0, 2), vec![1, 2]);
        assert_eq!(page_slice(items.clone(), 4, 2), vec![5]);
        assert_eq!(page_slice(items, 10, 2), Vec::<i64>::new());
    }
}
