//! Built-in station list

use crate::Station;

/// Default coastal stations along the Finnish coast
pub fn default_stations() -> Vec<Station> {
    vec![
        // Porkkala area
        Station::new("101023", "Emäsalo", "Porvoo", 60.2042, 25.6258),
        Station::new("101022", "Kalbådagrund", "Porkkala", 59.9747, 24.5281),
        Station::new("105392", "Itätoukki", "Sipoo", 60.2653, 25.2097),
        Station::new("151028", "Vuosaari", "Helsinki", 60.2075, 25.1947),
        // Maritime & coastal
        Station::new("100996", "Harmaja", "Helsinki Maritime", 60.1042, 24.9758),
        Station::new("100969", "Bågaskär", "Inkoo Coastal", 59.9025, 24.0419),
        Station::new("100965", "Jussarö", "Raasepori Maritime", 59.8133, 23.5639),
        Station::new("100946", "Tulliniemi", "Hanko Coastal", 59.8458, 22.9028),
        Station::new("100932", "Russarö", "Hanko Southern", 59.7686, 22.9533),
        Station::new("100945", "Vänö", "Kemiönsaari", 59.8906, 23.2569),
        Station::new("100908", "Utö", "Archipelago HELCOM", 59.7800, 21.3719),
        // Northern coastal
        Station::new("101267", "Tahkoluoto", "Pori", 61.6231, 21.4081),
        Station::new("101661", "Tankar", "Kokkola", 63.9583, 23.2681),
        Station::new("101673", "Ulkokalla", "Kalajoki", 64.3286, 23.3442),
        Station::new("101784", "Marjaniemi", "Hailuoto", 65.0361, 24.5583),
        Station::new("101794", "Vihreäsaari", "Oulu", 65.0403, 25.4244),
    ]
}
