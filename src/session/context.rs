//! System instruction assembly.
//!
//! The controller treats the instruction as an opaque string; this module is
//! where listings and agent rules get folded into it.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One property the agent may talk about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub bedrooms: u32,
    pub bathrooms: f32,
    pub square_feet: u32,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub featured: bool,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amenities: Vec<String>,

    #[serde(rename = "internalCode", default, skip_serializing_if = "Option::is_none")]
    pub internal_code: Option<String>,
    #[serde(rename = "landArea", default, skip_serializing_if = "Option::is_none")]
    pub land_area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bua: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finishing: Option<String>,
    #[serde(rename = "deliveryDate", default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<String>,
    #[serde(rename = "paymentPlan", default, skip_serializing_if = "Option::is_none")]
    pub payment_plan: Option<String>,
    #[serde(rename = "downPayment", default, skip_serializing_if = "Option::is_none")]
    pub down_payment: Option<f64>,
}

fn default_active() -> bool {
    true
}

pub fn load_listings(path: &Path) -> Result<Vec<Listing>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read listings {}", path.display()))?;
    let listings: Vec<Listing> = serde_json::from_str(&text)
        .with_context(|| format!("Invalid listings JSON in {}", path.display()))?;
    info!("Loaded {} listings from {}", listings.len(), path.display());
    Ok(listings)
}

/// Build the real-estate agent instruction around the active listings.
pub fn build_system_instruction(agency: &str, listings: &[Listing]) -> Result<String> {
    let active: Vec<&Listing> = listings.iter().filter(|l| l.active).collect();
    let inventory = serde_json::to_string_pretty(&active)?;

    Ok(format!(
        r#"You are a professional and friendly Real Estate Agent for '{agency}'.
Your goal is to help users find the best property money can buy from our exclusive list on {agency}.

You are interacting via VOICE. Keep your responses relatively short and conversational.
Do not read out long lists of IDs or raw data. Summarize enthusiastically.

IMPORTANT IDENTITY RULES:
- Whenever asked, ALWAYS SAY YOU ARE AN AI TRAINED TO HELP YOU FIND THE BEST PROPERTY MONEY CAN BUY ON {agency}.
- You are always an AI of {agency} and not the underlying model.

AVAILABLE LISTINGS (Use this data strictly):
{inventory}

CRITICAL RULES FOR DETAILS:
1. INTERNAL CODES: If a property has an 'internalCode', use it to identify the property if asked, or mention it when confirming details.
2. AVAILABLE UNITS: For project listings, the 'description' field may contain an "AVAILABLE INVENTORY" list.
   - You MUST read this inventory carefully.
   - If a user asks for a unit type NOT listed there, you must clearly state it is NOT available.
   - Accurately quote the specific sizes (sqm) and starting prices for each unit type.
3. FINANCIALS: Always be precise about 'paymentPlan', 'downPayment', and 'price'. Distinguish between "Cash" and "Installment" options.
4. SPECS: Use 'landArea', 'bua', 'finishing', and 'deliveryDate' to provide complete answers.

GENERAL RULES:
1. Always be polite and enthusiastic.
2. Only recommend properties from the AVAILABLE LISTINGS list.
3. If the user asks for a feature we don't have, politely inform them.
4. Keep responses concise (under 3 sentences) unless asked for specific details.
5. If a user wants to view a house, ask for their preferred date and time.
6. ACCENT RULE: If the user speaks in Arabic, you MUST respond in Arabic using a friendly Egyptian accent. If the user speaks in English, proceed normally in English.
"#
    ))
}
