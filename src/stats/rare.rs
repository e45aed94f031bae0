//! Rare commodity overrides
//!
//! Rares are sold at a single market in capped quantities; ordinary
//! min/avg/max aggregation over their scattered resale listings is
//! meaningless. This table ships with the binary, is keyed by the
//! lowercased symbol and is never updated from upstream. Sell pricing
//! for a rare is the observed buy price plus a fixed premium.

/// Fixed markup over the origin market's buy price
pub const RARE_GOODS_PREMIUM: i64 = 16_000;

pub struct RareCommodity {
    pub symbol: &'static str,
    pub name: &'static str,
}

pub static RARE_COMMODITIES: &[RareCommodity] = &[
    RareCommodity { symbol: "aepyornisegg", name: "Aepyornis Egg" },
    RareCommodity { symbol: "albinoquechuamammothmeat", name: "Albino Quechua Mammoth Meat" },
    RareCommodity { symbol: "altairianskin", name: "Altairian Skin" },
    RareCommodity { symbol: "anynacoffee", name: "Any Na Coffee" },
    RareCommodity { symbol: "azcancriformula42", name: "AZ Cancri Formula 42" },
    RareCommodity { symbol: "baltahsinevacuumkrill", name: "Baltah'sine Vacuum Krill" },
    RareCommodity { symbol: "cd75catcoffee", name: "CD-75 Kitten Brand Coffee" },
    RareCommodity { symbol: "centaurimegagin", name: "Centauri Mega Gin" },
    RareCommodity { symbol: "ceremonialheiketea", name: "Ceremonial Heike Tea" },
    RareCommodity { symbol: "cetirabbits", name: "Ceti Rabbits" },
    RareCommodity { symbol: "chateaudeaegaeon", name: "Chateau De Aegaeon" },
    RareCommodity { symbol: "chieridanimarinepaste", name: "Chi Eridani Marine Paste" },
    RareCommodity { symbol: "coquimspongiformvictuals", name: "Coquim Spongiform Victuals" },
    RareCommodity { symbol: "deltaphoenicispalms", name: "Delta Phoenicis Palms" },
    RareCommodity { symbol: "deuringastruffles", name: "Deuringas Truffles" },
    RareCommodity { symbol: "eraninpearlwhisky", name: "Eranin Pearl Whisky" },
    RareCommodity { symbol: "esusekucaviar", name: "Esuseku Caviar" },
    RareCommodity { symbol: "ethgrezeteabuds", name: "Ethgreze Tea Buds" },
    RareCommodity { symbol: "fujintea", name: "Fujin Tea" },
    RareCommodity { symbol: "giantirukamasnails", name: "Giant Irukama Snails" },
    RareCommodity { symbol: "gomanyauponcoffee", name: "Goman Yaupon Coffee" },
    RareCommodity { symbol: "haidneblackbrew", name: "Haiden Black Brew" },
    RareCommodity { symbol: "helvetitjpearls", name: "Helvetitj Pearls" },
    RareCommodity { symbol: "hip10175bushmeat", name: "HIP 10175 Bush Meat" },
    RareCommodity { symbol: "hip41181squid", name: "HIP 41181 Squid" },
    RareCommodity { symbol: "hiporganophosphates", name: "HIP Organophosphates" },
    RareCommodity { symbol: "jaquesquinentianstill", name: "Jaques Quinentian Still" },
    RareCommodity { symbol: "kamitracigars", name: "Kamitra Cigars" },
    RareCommodity { symbol: "karsukilocusts", name: "Karsuki Locusts" },
    RareCommodity { symbol: "konggaale", name: "Kongga Ale" },
    RareCommodity { symbol: "lavianbrandy", name: "Lavian Brandy" },
    RareCommodity { symbol: "lftvoidextractcoffee", name: "LFT Void Extract Coffee" },
    RareCommodity { symbol: "livehecateseaworms", name: "Live Hecate Sea Worms" },
    RareCommodity { symbol: "ngunamodernantiques", name: "Nguna Modern Antiques" },
    RareCommodity { symbol: "njangarisaddles", name: "Njangari Saddles" },
    RareCommodity { symbol: "ophiuchiexinoartefacts", name: "Ophiuch Exino Artefacts" },
    RareCommodity { symbol: "pantaaprayersticks", name: "Pantaa Prayer Sticks" },
    RareCommodity { symbol: "rajukrumultistoves", name: "Rajukru Multi-Stoves" },
    RareCommodity { symbol: "rusanioldsmokey", name: "Rusani Old Smokey" },
    RareCommodity { symbol: "sanumadecorativemeat", name: "Sanuma Decorative Meat" },
    RareCommodity { symbol: "soontillrelics", name: "Soontill Relics" },
    RareCommodity { symbol: "sothiscrystallinegold", name: "Sothis Crystalline Gold" },
    RareCommodity { symbol: "tanmarktranquiltea", name: "Tanmark Tranquil Tea" },
    RareCommodity { symbol: "tarachtorspice", name: "Tarach Spice" },
    RareCommodity { symbol: "toxandjivirocide", name: "Toxandji Virocide" },
    RareCommodity { symbol: "utgaroarmillennialeggs", name: "Utgaroar Millennial Eggs" },
    RareCommodity { symbol: "vanayequiceratomorphafur", name: "Vanayequi Ceratomorpha Fur" },
    RareCommodity { symbol: "vegaslimweed", name: "Vega Slimweed" },
    RareCommodity { symbol: "witchhaulkobebeef", name: "Witchhaul Kobe Beef" },
    RareCommodity { symbol: "xihecompanions", name: "Xihe Biomorphic Companions" },
];

/// Look up a commodity by its wire symbol (any case)
pub fn find(symbol: &str) -> Option<&'static RareCommodity> {
    let key = symbol.to_lowercase();
    RARE_COMMODITIES.iter().find(|rare| rare.symbol == key)
}
